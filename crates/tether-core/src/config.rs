//! Centralized configuration for tether.
//!
//! Wire constants that clients depend on live here next to the tunables of
//! the encoder and the session.

/// Diff encoder limits.
pub struct EncoderConfig;

impl EncoderConfig {
    /// Pointer nesting depth after which the encoder starts tracking visited
    /// addresses to detect cycles.
    pub const START_DETECTING_CYCLES_AFTER: usize = 1000;
}

/// Wire protocol keys and reserved names.
pub struct ProtocolConfig;

impl ProtocolConfig {
    /// Operation name the client sends when its window goes away.
    pub const TERMINATE_OPERATION: &'static str = "goui:gui_terminated";
    /// HTTP path the client opens its socket on.
    pub const SOCKET_PATH: &'static str = "/_socket";

    pub const NEW_NODE_MARKER: &'static str = "$m";
    pub const LIST_DIFF_KEY: &'static str = "$a";
    pub const LIST_LENGTH_KEY: &'static str = "$l";
    pub const INSERT_KEY: &'static str = "$i";
    pub const DELETE_KEY: &'static str = "$d";
}

/// Runtime options for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Escape `<`, `>` and `&` inside strings so frames can be inlined in a
    /// script tag.
    pub escape_html: bool,
    /// See [`EncoderConfig::START_DETECTING_CYCLES_AFTER`].
    pub cycle_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            escape_html: true,
            cycle_threshold: EncoderConfig::START_DETECTING_CYCLES_AFTER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_config() {
        let config = SessionConfig::default();
        assert!(config.escape_html);
        assert_eq!(config.cycle_threshold, 1000);
    }
}
