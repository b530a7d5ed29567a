//! Tunnel URL parsing

use tw_core::error::UrlParseError;

const TCP_SCHEME: &str = "tcp://";

/// Parse the relay's `tcp://<host>:<port>` address
pub fn parse_tunnel_url(raw: &str) -> Result<(String, u16), UrlParseError> {
    let trimmed = raw.trim();

    let rest = trimmed
        .strip_prefix(TCP_SCHEME)
        .ok_or_else(|| UrlParseError::MissingScheme(trimmed.to_string()))?;

    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| UrlParseError::MissingPort(trimmed.to_string()))?;

    if host.is_empty() {
        return Err(UrlParseError::EmptyHost(trimmed.to_string()));
    }

    match port.parse::<u16>() {
        Ok(port) if port != 0 => Ok((host.to_string(), port)),
        _ => Err(UrlParseError::InvalidPort(trimmed.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_url() {
        assert_eq!(
            parse_tunnel_url("tcp://10.0.0.5:4040"),
            Ok(("10.0.0.5".to_string(), 4040))
        );
    }

    #[test]
    fn test_parse_trims_output_whitespace() {
        assert_eq!(
            parse_tunnel_url("tcp://0.tcp.eu.ngrok.io:18422\n"),
            Ok(("0.tcp.eu.ngrok.io".to_string(), 18422))
        );
    }

    #[test]
    fn test_missing_scheme() {
        assert!(matches!(
            parse_tunnel_url("10.0.0.5:4040"),
            Err(UrlParseError::MissingScheme(_))
        ));
        assert!(matches!(
            parse_tunnel_url("http://10.0.0.5:4040"),
            Err(UrlParseError::MissingScheme(_))
        ));
    }

    #[test]
    fn test_missing_port() {
        assert!(matches!(
            parse_tunnel_url("tcp://10.0.0.5"),
            Err(UrlParseError::MissingPort(_))
        ));
    }

    #[test]
    fn test_bad_ports() {
        for raw in ["tcp://h:", "tcp://h:0", "tcp://h:70000", "tcp://h:22x"] {
            assert!(
                matches!(parse_tunnel_url(raw), Err(UrlParseError::InvalidPort(_))),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_empty_host() {
        assert!(matches!(
            parse_tunnel_url("tcp://:22"),
            Err(UrlParseError::EmptyHost(_))
        ));
    }

    #[test]
    fn test_empty_output() {
        assert!(parse_tunnel_url("").is_err());
    }
}
