//! Process-wide tunables.
//!
//! The on-disk page layout (`HeapPage`'s slot math) is pinned to the
//! compile-time constants `PAGE_SIZE` (see `buffer_pool`) and `STRING_SIZE`
//! (see `types`). Changing either changes the byte format, so this struct
//! does not feed them back into layout math. It exists so a caller can read
//! the active values once at startup (e.g. to log them) and to leave a seam
//! for environment-driven overrides without touching the storage format.

use crate::buffer_pool::PAGE_SIZE;
use crate::types::STRING_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub page_size: usize,
    pub string_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            page_size: PAGE_SIZE,
            string_len: STRING_SIZE,
        }
    }
}

impl Config {
    /// Reads `DB_PAGE_SIZE`/`DB_STRING_LEN` from the environment for
    /// diagnostic purposes, falling back to the compiled-in defaults.
    /// Logs a warning if an override disagrees with the compiled layout,
    /// since the storage format cannot actually change at runtime.
    pub fn from_env() -> Self {
        let cfg = Config::default();
        let mut effective = cfg;

        if let Ok(v) = std::env::var("DB_PAGE_SIZE") {
            match v.parse::<usize>() {
                Ok(page_size) => effective.page_size = page_size,
                Err(_) => log::warn!("DB_PAGE_SIZE={:?} is not a valid integer, ignoring", v),
            }
        }
        if let Ok(v) = std::env::var("DB_STRING_LEN") {
            match v.parse::<usize>() {
                Ok(string_len) => effective.string_len = string_len,
                Err(_) => log::warn!("DB_STRING_LEN={:?} is not a valid integer, ignoring", v),
            }
        }

        if effective.page_size != cfg.page_size || effective.string_len != cfg.string_len {
            log::warn!(
                "configuration requests page_size={} string_len={}, but the compiled page format \
                 is fixed at page_size={} string_len={}; the overrides are ignored for layout and \
                 only reported here",
                effective.page_size,
                effective.string_len,
                cfg.page_size,
                cfg.string_len,
            );
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_compiled_layout() {
        let cfg = Config::default();
        assert_eq!(cfg.page_size, PAGE_SIZE);
        assert_eq!(cfg.string_len, STRING_SIZE);
    }
}
