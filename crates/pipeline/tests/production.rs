mod common;

use assert_matches::assert_matches;
use common::{items, request, FakeSynthesizer};
use stickerkit_core::lifecycle::ItemStatus;
use stickerkit_core::slicer::GridSlicer;
use stickerkit_pipeline::board::DETECTION_MISS_REASON;
use stickerkit_pipeline::production::RUN_FAILED_REASON;
use stickerkit_pipeline::{ItemBoard, PipelineError, StickerPipeline};

#[tokio::test]
async fn blank_cell_is_a_detection_miss_not_a_failure() {
    let req = request(16);
    let configs = items(16);
    let board = ItemBoard::new(&configs).unwrap();
    let pipeline = StickerPipeline::new(
        FakeSynthesizer::blanking(&["item-13"]),
        GridSlicer::default(),
    );

    let output = pipeline.produce(&configs, &board, &req, |_| {}).await.unwrap();

    let counts = output.summary.counts();
    assert_eq!((counts.expected, counts.produced), (16, 15));
    assert_eq!(output.assignment.missing, vec!["item-13".to_string()]);
    assert_eq!(output.summary.reports[0].missing_cells, vec![13]);

    assert_eq!(board.status("item-13").await.unwrap(), ItemStatus::Error);
    assert_eq!(board.status("item-12").await.unwrap(), ItemStatus::Success);
    let reason = board
        .with_item("item-13", |l| l.last_error().map(str::to_string))
        .await
        .unwrap();
    assert_eq!(reason.as_deref(), Some(DETECTION_MISS_REASON));
}

#[tokio::test]
async fn failed_run_leaves_every_item_in_error() {
    let req = request(8);
    let configs = items(20);
    let board = ItemBoard::new(&configs).unwrap();
    let pipeline = StickerPipeline::new(FakeSynthesizer::failing_on(1), GridSlicer::default());

    let result = pipeline.produce(&configs, &board, &req, |_| {}).await;

    assert_matches!(result, Err(PipelineError::ExternalCall { sheet_index: 1, .. }));
    for snap in board.snapshot().await {
        assert_eq!(snap.status, ItemStatus::Error);
        assert_eq!(snap.last_error.as_deref(), Some(RUN_FAILED_REASON));
        assert!(!snap.has_image);
    }
    assert!(board.export().await.is_empty());
}

#[tokio::test]
async fn multi_sheet_run_assigns_items_by_absolute_index() {
    let req = request(8);
    let configs = items(20);
    let board = ItemBoard::new(&configs).unwrap();
    let pipeline = StickerPipeline::new(FakeSynthesizer::default(), GridSlicer::default());

    let output = pipeline.produce(&configs, &board, &req, |_| {}).await.unwrap();

    assert_eq!(output.assignment.assigned, 20);
    assert!(output.assignment.unmatched.is_empty());
    let digest = output.digest();
    assert_eq!(digest.sheets, 3);
    assert!(digest.missing_items.is_empty());

    let exported: Vec<String> = board.export().await.into_iter().map(|e| e.item_id).collect();
    let expected: Vec<String> = configs.iter().map(|c| c.id.clone()).collect();
    assert_eq!(exported, expected);

    let first = &board.export().await[0];
    assert_eq!(first.image.dimensions(), (180, 180));
}

#[tokio::test]
async fn empty_batch_succeeds_without_calls() {
    let req = request(8);
    let board = ItemBoard::new(&[]).unwrap();
    let pipeline = StickerPipeline::new(FakeSynthesizer::default(), GridSlicer::default());

    let output = pipeline.produce(&[], &board, &req, |_| {}).await.unwrap();

    assert!(output.summary.no_objects_detected());
    assert!(pipeline.orchestrator().synthesizer().calls().is_empty());
}

#[tokio::test]
async fn main_item_follows_success() {
    let req = request(8);
    let configs = items(8);
    let board = ItemBoard::new(&configs).unwrap();
    let pipeline = StickerPipeline::new(
        FakeSynthesizer::blanking(&["item-0"]),
        GridSlicer::default(),
    );

    pipeline.produce(&configs, &board, &req, |_| {}).await.unwrap();

    assert_eq!(board.main_item().await.as_deref(), Some("item-1"));
    board.set_main("item-5").await.unwrap();
    assert_eq!(board.main_item().await.as_deref(), Some("item-5"));
}
