//! User agent selection for requests to the remote board.

pub const USER_AGENT: &str = concat!(
    "guestbook-import/",
    env!("CARGO_PKG_VERSION"),
    " (legacy guestbook migration)"
);

/// Real browser user agents for impersonate mode.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36 Whale/4.32.315.22",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:140.0) Gecko/20100101 Firefox/140.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.5 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36 Edg/138.0.0.0",
];

/// Config value that selects a browser agent instead of the crate's own.
pub const IMPERSONATE: &str = "impersonate";

fn pick_browser_agent() -> &'static str {
    let roll = uuid::Uuid::new_v4().as_u128() as usize;
    IMPERSONATE_USER_AGENTS[roll % IMPERSONATE_USER_AGENTS.len()]
}

/// User agent for a `user_agent` setting: unset or blank means the crate's
/// agent, `impersonate` (any case) a browser agent, anything else is sent
/// as given.
pub fn resolve_user_agent(setting: Option<&str>) -> String {
    match setting.map(str::trim).filter(|s| !s.is_empty()) {
        None => USER_AGENT.to_string(),
        Some(s) if s.eq_ignore_ascii_case(IMPERSONATE) => pick_browser_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_or_blank_uses_crate_agent() {
        assert_eq!(resolve_user_agent(None), USER_AGENT);
        assert_eq!(resolve_user_agent(Some("  ")), USER_AGENT);
        assert!(USER_AGENT.starts_with("guestbook-import/"));
    }

    #[test]
    fn test_impersonate_picks_browser_agent() {
        for setting in ["impersonate", "Impersonate"] {
            let ua = resolve_user_agent(Some(setting));
            assert!(IMPERSONATE_USER_AGENTS.contains(&ua.as_str()));
        }
    }

    #[test]
    fn test_custom_agent_passes_through() {
        let ua = resolve_user_agent(Some("MyBot/1.0"));
        assert_eq!(ua, "MyBot/1.0");
    }

    #[test]
    fn test_impersonate_pool_is_browser_agents() {
        assert!(IMPERSONATE_USER_AGENTS
            .iter()
            .all(|ua| ua.starts_with("Mozilla/5.0")));
    }
}
