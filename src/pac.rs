//! PAC script generation
//!
//! Two output formats are supported and kept separate because clients
//! depend on the exact shape of whichever one they were handed:
//!
//! - `EmbeddedLogic` serializes the whole [`HostConfig`] as a JSON literal
//!   into a fixed JavaScript template that carries its own copy of the
//!   matcher and resolver. The browser evaluates the same first-match,
//!   multi-proxy logic as [`crate::resolver::resolve`].
//! - `PreExpanded` turns every rule into a regex test that returns the
//!   proxy of the rule's *first* host id only, or `DIRECT` when that id
//!   is missing.

use crate::error::Result;
use crate::model::HostConfig;
use crate::resolver::{self, DIRECT};
use std::fmt::Write as _;
use tracing::debug;

/// Content type PAC files are served with
pub const PAC_CONTENT_TYPE: &str = "application/x-ns-proxy-autoconfig";

const EMBEDDED_TEMPLATE: &str = include_str!("templates/embedded.js");
const CONFIG_PLACEHOLDER: &str = "{{CONFIG}}";

/// Output format of a generated PAC script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacFormat {
    #[default]
    EmbeddedLogic,
    PreExpanded,
}

impl PacFormat {
    /// Parse the short names used on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "embedded" => Some(PacFormat::EmbeddedLogic),
            "static" => Some(PacFormat::PreExpanded),
            _ => None,
        }
    }

    /// Download file name for this format
    pub fn file_name(&self) -> &'static str {
        match self {
            PacFormat::EmbeddedLogic => "proxy.pac",
            PacFormat::PreExpanded => "auto.pac",
        }
    }
}

/// Render `config` as a PAC script in the requested format
pub fn render(config: &HostConfig, format: PacFormat) -> Result<String> {
    debug!(
        "Rendering {:?} PAC for {} host(s), {} rule(s)",
        format,
        config.hosts.len(),
        config.rules.len()
    );

    match format {
        PacFormat::EmbeddedLogic => render_embedded(config),
        PacFormat::PreExpanded => render_pre_expanded(config),
    }
}

fn render_embedded(config: &HostConfig) -> Result<String> {
    let literal = js_safe(serde_json::to_string_pretty(config)?);
    Ok(EMBEDDED_TEMPLATE.replacen(CONFIG_PLACEHOLDER, &literal, 1))
}

fn render_pre_expanded(config: &HostConfig) -> Result<String> {
    let mut out = String::with_capacity(256 + config.rules.len() * 64);

    out.push_str("function FindProxyForURL(url, host) {\n");
    out.push_str("  var proxies = {\n");
    for (i, host) in config.hosts.iter().enumerate() {
        let sep = if i + 1 < config.hosts.len() { "," } else { "" };
        let _ = writeln!(
            out,
            "    \"{}\": {}{}",
            host.id,
            js_string(&resolver::directive(host))?,
            sep
        );
    }
    out.push_str("  };\n");

    for (rule, host) in resolver::first_hosts(config) {
        let target = match host {
            Some(host) => format!("proxies[\"{}\"]", host.id),
            None => format!("\"{}\"", DIRECT),
        };
        let _ = writeln!(
            out,
            "  if (/^{}$/.test(host)) return {};",
            pattern_to_regex(&rule.pattern),
            target
        );
    }

    let _ = writeln!(out, "  return \"{}\";", DIRECT);
    out.push_str("}\n");

    Ok(out)
}

/// Translate a rule pattern into regex source.
///
/// Dots are escaped first and only then is `*` expanded to `.*`; doing it
/// the other way round would escape the dot inside `.*`.
pub fn pattern_to_regex(pattern: &str) -> String {
    pattern.replace('.', "\\.").replace('*', ".*")
}

fn js_string(value: &str) -> Result<String> {
    Ok(js_safe(serde_json::to_string(value)?))
}

/// JSON is a JavaScript literal except for raw U+2028/U+2029, which older
/// engines treat as line terminators inside strings
fn js_safe(json: String) -> String {
    if json.contains(|c: char| c == '\u{2028}' || c == '\u{2029}') {
        json.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
    } else {
        json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Host, ProxyType, Rule};
    use boa_engine::{Context, Source};

    fn config() -> HostConfig {
        HostConfig {
            hosts: vec![
                Host {
                    id: 1,
                    name: Some("office".to_string()),
                    host: "proxy.example.com".to_string(),
                    port: 8080,
                    proxy_type: Some(ProxyType::Socks),
                },
                Host {
                    id: 2,
                    name: None,
                    host: "proxy2.example.com".to_string(),
                    port: 8081,
                    proxy_type: None,
                },
            ],
            rules: vec![
                Rule {
                    pattern: "*.example.com".to_string(),
                    host_ids: vec![1, 2],
                },
                Rule {
                    pattern: "intranet".to_string(),
                    host_ids: vec![2],
                },
                Rule {
                    pattern: "empty.org".to_string(),
                    host_ids: vec![],
                },
            ],
        }
    }

    fn embedded_literal(script: &str) -> &str {
        let start = script.find("var config = ").unwrap() + "var config = ".len();
        let end = script.find(";\n\nfunction matches").unwrap();
        &script[start..end]
    }

    #[test]
    fn test_format_names() {
        assert_eq!(PacFormat::from_name("embedded"), Some(PacFormat::EmbeddedLogic));
        assert_eq!(PacFormat::from_name("STATIC"), Some(PacFormat::PreExpanded));
        assert_eq!(PacFormat::from_name("yaml"), None);
        assert_eq!(PacFormat::EmbeddedLogic.file_name(), "proxy.pac");
        assert_eq!(PacFormat::PreExpanded.file_name(), "auto.pac");
    }

    #[test]
    fn test_embedded_carries_config() {
        let config = config();
        let script = render(&config, PacFormat::EmbeddedLogic).unwrap();

        let parsed: HostConfig = serde_json::from_str(embedded_literal(&script)).unwrap();
        assert_eq!(parsed, config);
        assert!(!script.contains(CONFIG_PLACEHOLDER));
        assert!(script.contains("function FindProxyForURL(url, host) {"));
        assert!(script.contains("return resolve(config, url, host);"));
    }

    #[test]
    fn test_embedded_escapes_line_separators() {
        let mut config = config();
        config.hosts[0].name = Some("a\u{2028}b".to_string());
        let script = render(&config, PacFormat::EmbeddedLogic).unwrap();
        assert!(!script.contains('\u{2028}'));
        assert!(script.contains("a\\u2028b"));
    }

    #[test]
    fn test_pattern_to_regex() {
        assert_eq!(pattern_to_regex("*.example.com"), ".*\\.example\\.com");
        assert_eq!(pattern_to_regex("example.com"), "example\\.com");
        assert_eq!(pattern_to_regex("intranet"), "intranet");
    }

    #[test]
    fn test_pre_expanded_output() {
        let script = render(&config(), PacFormat::PreExpanded).unwrap();
        let expected = "function FindProxyForURL(url, host) {\n  \
             var proxies = {\n    \
             \"1\": \"SOCKS proxy.example.com:8080\",\n    \
             \"2\": \"PROXY proxy2.example.com:8081\"\n  \
             };\n  \
             if (/^.*\\.example\\.com$/.test(host)) return proxies[\"1\"];\n  \
             if (/^intranet$/.test(host)) return proxies[\"2\"];\n  \
             if (/^empty\\.org$/.test(host)) return \"DIRECT\";\n  \
             return \"DIRECT\";\n\
             }\n";
        assert_eq!(script, expected);
    }

    #[test]
    fn test_pre_expanded_regex_semantics() {
        let source = format!("^{}$", pattern_to_regex("*.example.com"));
        let re = regex::Regex::new(&source).unwrap();
        assert!(re.is_match("www.example.com"));
        assert!(re.is_match("a.b.example.com"));
        assert!(!re.is_match("wwwxexample.com"));
        assert!(!re.is_match("www.example.com.evil"));
    }

    #[test]
    fn test_pre_expanded_empty_config() {
        let script = render(&HostConfig::default(), PacFormat::PreExpanded).unwrap();
        assert!(script.contains("var proxies = {\n  };"));
        assert!(script.trim_end().ends_with("return \"DIRECT\";\n}"));
    }

    /// Evaluate a rendered script and call its `FindProxyForURL`
    fn run_pac(script: &str, host: &str) -> String {
        let mut context = Context::default();
        context.eval(Source::from_bytes(script)).unwrap();

        let call = format!(
            "FindProxyForURL({}, {})",
            serde_json::to_string(&format!("http://{}/", host)).unwrap(),
            serde_json::to_string(host).unwrap()
        );
        let result = context.eval(Source::from_bytes(&call)).unwrap();
        result.to_string(&mut context).unwrap().to_std_string_escaped()
    }

    #[test]
    fn test_embedded_script_agrees_with_resolver() {
        let mut config = config();
        config.rules.insert(
            0,
            Rule {
                pattern: "www.example.com".to_string(),
                host_ids: vec![2],
            },
        );
        config.rules.push(Rule {
            pattern: "dangling.net".to_string(),
            host_ids: vec![9, 1],
        });
        let script = render(&config, PacFormat::EmbeddedLogic).unwrap();

        for host in [
            "www.example.com",
            "sub.example.com",
            "example.com",
            "evilexample.com",
            "intranet",
            "empty.org",
            "dangling.net",
            "nomatch.org",
        ] {
            let url = format!("http://{}/", host);
            assert_eq!(
                run_pac(&script, host),
                resolver::resolve(&config, &url, host),
                "host {}",
                host
            );
        }
    }

    #[test]
    fn test_pre_expanded_dangling_first_id_keeps_precedence() {
        let mut config = config();
        config.rules = vec![
            Rule {
                pattern: "*.example.com".to_string(),
                host_ids: vec![9],
            },
            Rule {
                pattern: "www.example.com".to_string(),
                host_ids: vec![1],
            },
        ];
        let script = render(&config, PacFormat::PreExpanded).unwrap();

        assert!(script.contains("if (/^.*\\.example\\.com$/.test(host)) return \"DIRECT\";"));
        assert_eq!(run_pac(&script, "www.example.com"), "DIRECT");
        assert_eq!(resolver::resolve(&config, "", "www.example.com"), "DIRECT");
    }

    #[test]
    fn test_pre_expanded_script_returns_first_proxy() {
        let script = render(&config(), PacFormat::PreExpanded).unwrap();

        assert_eq!(run_pac(&script, "www.example.com"), "SOCKS proxy.example.com:8080");
        assert_eq!(run_pac(&script, "intranet"), "PROXY proxy2.example.com:8081");
        assert_eq!(run_pac(&script, "empty.org"), "DIRECT");
        assert_eq!(run_pac(&script, "nomatch.org"), "DIRECT");
    }
}
