//! Slash-command parsing for chat messages.

/// A parsed chat command. Anything that is not a known slash command is
/// `Natural` and gets routed by keyword detection instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    /// `/scan <target>`
    Scan { target: String },
    /// `/think <question>`
    Think { query: String },
    /// `/search <query> [in <collection>]`
    Search {
        query: String,
        collection: Option<String>,
    },
    /// `/report [daily|weekly|latest|summary]`
    Report { kind: String },
    /// `/rss` — trigger a feed run now
    Rss,
    /// `/vpn [list|status|connect <profile>|disconnect <profile>]`
    Vpn { action: String, profile: Option<String> },
    /// Free text.
    Natural { text: String },
}

impl Command {
    pub fn parse(text: &str) -> Command {
        let text = text.trim();
        if !text.starts_with('/') {
            return Command::Natural { text: text.to_string() };
        }

        let mut parts = text.splitn(2, char::is_whitespace);
        let head = parts.next().unwrap_or_default();
        // Strip a "@botname" suffix from group chats.
        let head = head.split('@').next().unwrap_or(head);
        let rest = parts.next().unwrap_or("").trim();

        match head {
            "/start" => Command::Start,
            "/help" => Command::Help,
            "/status" => Command::Status,
            "/scan" => Command::Scan { target: rest.to_string() },
            "/think" => Command::Think { query: rest.to_string() },
            "/search" => parse_search(rest),
            "/report" => Command::Report {
                kind: if rest.is_empty() { "daily".into() } else { rest.to_lowercase() },
            },
            "/rss" => Command::Rss,
            "/vpn" => parse_vpn(rest),
            _ => Command::Natural { text: text.to_string() },
        }
    }
}

fn parse_search(rest: &str) -> Command {
    // "/search sqli in web_security" scopes the search to one collection.
    // The parser cannot know the collection names; the router validates the
    // scope and folds it back into the query when it is not a real
    // collection, so "log in failures" still searches for the full phrase.
    if let Some((query, collection)) = rest.rsplit_once(" in ") {
        let collection = collection.trim();
        if !collection.is_empty() && !collection.contains(' ') && !query.trim().is_empty() {
            return Command::Search {
                query: query.trim().to_string(),
                collection: Some(collection.to_string()),
            };
        }
    }
    Command::Search {
        query: rest.to_string(),
        collection: None,
    }
}

fn parse_vpn(rest: &str) -> Command {
    let mut parts = rest.split_whitespace();
    let action = parts.next().unwrap_or("status").to_lowercase();
    let profile = parts.next().map(|s| s.to_string());
    Command::Vpn { action, profile }
}

/// The /help text.
pub fn help_text() -> &'static str {
    "*RedClaw commands*\n\
     /scan <target> — staged recon scan (nmap, gobuster, wpscan)\n\
     /think <question> — security analysis with knowledge-base context\n\
     /search <query> [in <collection>] — search the knowledge base\n\
     /rss — pull the configured feeds now\n\
     /report [daily|weekly|latest|summary] — generate or fetch a report\n\
     /vpn [list|status|connect <p>|disconnect <p>] — manage VPN profiles\n\
     /status — platform health\n\
     \n\
     Send a document to ingest it. Plain text is routed by intent."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scan() {
        assert_eq!(
            Command::parse("/scan 192.168.1.10"),
            Command::Scan { target: "192.168.1.10".into() }
        );
    }

    #[test]
    fn test_parse_botname_suffix() {
        assert_eq!(Command::parse("/status@redclaw_bot"), Command::Status);
    }

    #[test]
    fn test_parse_search_with_collection() {
        assert_eq!(
            Command::parse("/search jwt bypass in web_security"),
            Command::Search {
                query: "jwt bypass".into(),
                collection: Some("web_security".into()),
            }
        );
    }

    #[test]
    fn test_parse_search_plain() {
        assert_eq!(
            Command::parse("/search apache rce"),
            Command::Search { query: "apache rce".into(), collection: None }
        );
    }

    #[test]
    fn test_parse_search_ambiguous_in_becomes_scope() {
        // The router is responsible for folding a non-collection scope back
        // into the query text.
        assert_eq!(
            Command::parse("/search log in failures"),
            Command::Search { query: "log".into(), collection: Some("failures".into()) }
        );
    }

    #[test]
    fn test_parse_report_default() {
        assert_eq!(Command::parse("/report"), Command::Report { kind: "daily".into() });
        assert_eq!(Command::parse("/report WEEKLY"), Command::Report { kind: "weekly".into() });
    }

    #[test]
    fn test_parse_vpn() {
        assert_eq!(
            Command::parse("/vpn connect htb"),
            Command::Vpn { action: "connect".into(), profile: Some("htb".into()) }
        );
        assert_eq!(
            Command::parse("/vpn"),
            Command::Vpn { action: "status".into(), profile: None }
        );
    }

    #[test]
    fn test_free_text_is_natural() {
        assert_eq!(
            Command::parse("how do I exploit this?"),
            Command::Natural { text: "how do I exploit this?".into() }
        );
    }

    #[test]
    fn test_unknown_slash_is_natural() {
        assert_eq!(
            Command::parse("/dance"),
            Command::Natural { text: "/dance".into() }
        );
    }
}
