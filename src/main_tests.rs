// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `main.rs` - argument parsing and signal handling

#[cfg(test)]
mod tests {
    use crate::{parse_label, Args};
    use clap::Parser;
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    #[test]
    fn test_parse_label() {
        assert_eq!(
            parse_label("app=clusterdomain"),
            Ok(("app".to_string(), "clusterdomain".to_string()))
        );
        assert_eq!(
            parse_label(" tier = web "),
            Ok(("tier".to_string(), "web".to_string()))
        );
        assert!(parse_label("novalue").is_err());
        assert!(parse_label("=value").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["clusterdomain"]).unwrap();
        assert_eq!(args.dns_renew_interval_secs, 86_400);
        assert_eq!(args.challenge_timeout_secs, 300);
        assert_eq!(args.http01_ready_timeout_secs, 60);
        assert_eq!(
            args.http01_selector,
            vec![("app".to_string(), "clusterdomain".to_string())]
        );
    }

    #[test]
    fn test_args_repeated_selector() {
        let args = Args::try_parse_from([
            "clusterdomain",
            "--namespace",
            "dns-system",
            "--http01-selector",
            "app=clusterdomain",
            "--http01-selector",
            "component=controller",
        ])
        .unwrap();

        assert_eq!(args.namespace, "dns-system");
        assert_eq!(args.http01_selector.len(), 2);
        assert_eq!(args.http01_selector[1].0, "component");
    }

    #[test]
    fn test_args_comma_separated_selector() {
        let args = Args::try_parse_from([
            "clusterdomain",
            "--http01-selector",
            "app=web,tier=edge",
        ])
        .unwrap();

        assert_eq!(
            args.http01_selector,
            vec![
                ("app".to_string(), "web".to_string()),
                ("tier".to_string(), "edge".to_string()),
            ]
        );
    }

    /// Test that SIGTERM signal handler can be created on Unix platforms
    #[tokio::test]
    #[cfg(unix)]
    async fn test_sigterm_signal_handler_creation() {
        use tokio::signal::unix::{signal, SignalKind};

        let result = signal(SignalKind::terminate());
        assert!(
            result.is_ok(),
            "Should be able to create SIGTERM signal handler"
        );
    }

    #[tokio::test]
    async fn test_shutdown_signal_waits_without_signal() {
        let result = timeout(StdDuration::from_millis(100), crate::shutdown_signal()).await;
        assert!(result.is_err(), "shutdown should not resolve without a signal");
    }
}
