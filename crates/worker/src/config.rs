use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use stickerkit_core::chroma::DEFAULT_KEY_TOLERANCE;
use stickerkit_core::grid_spec::{Variant, DEFAULT_STICKER_COUNT};

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local synthesis service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Base URL of the synthesis service.
    pub api_url: String,
    /// Optional bearer token sent with every synthesis call.
    pub api_key: Option<String>,
    pub variant: Variant,
    /// Grid item count; unsupported counts fall back per variant.
    pub item_count: u32,
    pub chroma_tolerance: u8,
    /// Time spent in `Cooldown` before each single-item retry.
    pub retry_cooldown: Duration,
    pub output_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".into(),
            api_key: None,
            variant: Variant::Sticker,
            item_count: DEFAULT_STICKER_COUNT,
            chroma_tolerance: DEFAULT_KEY_TOLERANCE,
            retry_cooldown: Duration::ZERO,
            output_dir: PathBuf::from("./stickers"),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                 |
    /// |-----------------------|-------------------------|
    /// | `SYNTHESIS_API_URL`   | `http://localhost:8080` |
    /// | `SYNTHESIS_API_KEY`   | unset                   |
    /// | `STICKER_VARIANT`     | `sticker`               |
    /// | `STICKER_COUNT`       | `8`                     |
    /// | `CHROMA_TOLERANCE`    | `40`                    |
    /// | `RETRY_COOLDOWN_SECS` | `0`                     |
    /// | `OUTPUT_DIR`          | `./stickers`            |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    /// Unparseable values are logged and replaced by their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api_url = lookup("SYNTHESIS_API_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.api_url);
        let api_key = lookup("SYNTHESIS_API_KEY").filter(|s| !s.is_empty());
        let variant = parse_or(&lookup, "STICKER_VARIANT", defaults.variant);
        let item_count = parse_or(&lookup, "STICKER_COUNT", defaults.item_count);
        let chroma_tolerance = parse_or(&lookup, "CHROMA_TOLERANCE", defaults.chroma_tolerance);
        let cooldown_secs: u64 = parse_or(&lookup, "RETRY_COOLDOWN_SECS", 0);
        let output_dir = lookup("OUTPUT_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        Self {
            api_url,
            api_key,
            variant,
            item_count,
            chroma_tolerance,
            retry_cooldown: Duration::from_secs(cooldown_secs),
            output_dir,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, ?default, "Invalid config value, using default");
            default
        }
    }
}
