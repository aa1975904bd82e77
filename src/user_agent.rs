//! User-Agent selection for outgoing engine requests.

use rand::seq::SliceRandom;

/// Realistic browser User-Agent strings used when no fixed agent is configured.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Source of User-Agent headers, chosen when the engine registry is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgentPolicy {
    /// Always send the same agent.
    Fixed(String),
    /// Pick a random agent from the list for every request.
    Rotate(Vec<String>),
}

impl UserAgentPolicy {
    /// Rotation over the built-in browser list.
    pub fn builtin() -> Self {
        Self::Rotate(USER_AGENTS.iter().map(|ua| ua.to_string()).collect())
    }

    /// Fixed agent if one is given, built-in rotation otherwise.
    pub fn from_option(user_agent: Option<String>) -> Self {
        match user_agent {
            Some(ua) if !ua.trim().is_empty() => Self::Fixed(ua),
            _ => Self::builtin(),
        }
    }

    /// Agent for the next request.
    pub fn next(&self) -> String {
        match self {
            Self::Fixed(ua) => ua.clone(),
            Self::Rotate(list) => list
                .choose(&mut rand::thread_rng())
                .cloned()
                .unwrap_or_else(|| USER_AGENTS[0].to_string()),
        }
    }
}

impl Default for UserAgentPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}
