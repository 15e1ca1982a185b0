use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_COMMENT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_COMMENT_THREAD_CAPACITY: usize = 16;
pub const DEFAULT_MAX_COMMENT_LENGTH: usize = 2_000;
pub const DEFAULT_MAX_SEARCH_QUERY_LENGTH: usize = 200;
pub const DEFAULT_MAX_CACHED_ITEMS: usize = 500;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be > 0")]
    Zero { field: &'static str },
    #[error("{field} is {value}, maximum is {max}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("max_cached_items ({max_cached_items}) must hold at least one page ({page_size})")]
    WindowSmallerThanPage {
        max_cached_items: usize,
        page_size: u32,
    },
}

/// Per-session tuning for the feed engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub page_size: u32,
    pub comment_page_size: u32,
    pub comment_thread_capacity: usize,
    pub max_comment_length: usize,
    pub max_search_query_length: usize,
    pub max_cached_items: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            comment_page_size: DEFAULT_COMMENT_PAGE_SIZE,
            comment_thread_capacity: DEFAULT_COMMENT_THREAD_CAPACITY,
            max_comment_length: DEFAULT_MAX_COMMENT_LENGTH,
            max_search_query_length: DEFAULT_MAX_SEARCH_QUERY_LENGTH,
            max_cached_items: DEFAULT_MAX_CACHED_ITEMS,
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Zero { field: "page_size" });
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::TooLarge {
                field: "page_size",
                value: u64::from(self.page_size),
                max: u64::from(MAX_PAGE_SIZE),
            });
        }
        if self.comment_page_size == 0 {
            return Err(ConfigError::Zero {
                field: "comment_page_size",
            });
        }
        if self.comment_page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::TooLarge {
                field: "comment_page_size",
                value: u64::from(self.comment_page_size),
                max: u64::from(MAX_PAGE_SIZE),
            });
        }
        if self.comment_thread_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "comment_thread_capacity",
            });
        }
        if self.max_comment_length == 0 {
            return Err(ConfigError::Zero {
                field: "max_comment_length",
            });
        }
        if self.max_search_query_length == 0 {
            return Err(ConfigError::Zero {
                field: "max_search_query_length",
            });
        }
        if self.max_cached_items < self.page_size as usize {
            return Err(ConfigError::WindowSmallerThanPage {
                max_cached_items: self.max_cached_items,
                page_size: self.page_size,
            });
        }
        Ok(())
    }

    /// Falls back to the default capacity for an unvalidated zero.
    #[must_use]
    pub fn thread_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.comment_thread_capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_COMMENT_THREAD_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(FeedConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_page_size_rejected() {
        let config = FeedConfig {
            page_size: 0,
            ..FeedConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero { field: "page_size" })
        );
    }

    #[test]
    fn oversized_comment_page_rejected() {
        let config = FeedConfig {
            comment_page_size: 500,
            ..FeedConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooLarge {
                field: "comment_page_size",
                ..
            })
        ));
    }

    #[test]
    fn window_must_hold_a_page() {
        let config = FeedConfig {
            page_size: 20,
            max_cached_items: 10,
            ..FeedConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WindowSmallerThanPage { .. })
        ));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: FeedConfig = serde_json::from_str(r#"{"page_size": 5}"#).unwrap();
        assert_eq!(config.page_size, 5);
        assert_eq!(config.comment_page_size, DEFAULT_COMMENT_PAGE_SIZE);
    }
}
