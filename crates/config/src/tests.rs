use std::time::Duration;

use figment::Jail;
use icu_common::SameSite;

use crate::AppConfig;

#[test]
fn test_defaults_without_any_file() {
    Jail::expect_with(|_jail| {
        let config = AppConfig::load(".").map_err(|e| e.to_string())?;
        assert_eq!(config.app_name, "icu-reserve");
        assert!(config.is_development());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.session.token_ttl_days, 7);
        assert_eq!(config.session.same_site, SameSite::Strict);
        assert!(!config.cookie_secure());
        assert!(config.directory.seed_file.is_none());
        Ok(())
    });
}

#[test]
fn test_environment_file_overrides_default() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "default.toml",
            r#"
                app_name = "ward-7"

                [server]
                port = 8080

                [session]
                same_site = "lax"
            "#,
        )?;
        jail.create_file(
            "production.toml",
            r#"
                app_env = "production"

                [server]
                port = 443
            "#,
        )?;
        jail.set_env("APP_ENV", "production");

        let config = AppConfig::load(".").map_err(|e| e.to_string())?;
        assert_eq!(config.app_name, "ward-7");
        assert_eq!(config.server.port, 443);
        assert_eq!(config.session.same_site, SameSite::Lax);
        assert!(config.is_production());
        assert!(config.cookie_secure());
        Ok(())
    });
}

#[test]
fn test_prefixed_env_vars_win() {
    Jail::expect_with(|jail| {
        jail.create_file("default.toml", "[server]\nport = 8080\n")?;
        jail.set_env("ICU_SERVER__PORT", "9090");
        jail.set_env("ICU_SESSION__SECURE", "true");
        jail.set_env("ICU_REALTIME__RECONNECT_MAX_DELAY_MS", "250");

        let config = AppConfig::load(".").map_err(|e| e.to_string())?;
        assert_eq!(config.server.port, 9090);
        assert!(config.cookie_secure());
        assert_eq!(config.realtime.reconnect_max_delay_ms, 250);
        Ok(())
    });
}

#[test]
fn test_reconnect_policy_is_unlimited_and_capped() {
    Jail::expect_with(|_jail| {
        let config = AppConfig::load(".").map_err(|e| e.to_string())?;
        let policy = config.realtime.reconnect_policy();
        assert!(policy.max_attempts.is_none());
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_secs(5));
        Ok(())
    });
}

#[test]
fn test_invalid_value_is_reported() {
    Jail::expect_with(|jail| {
        jail.create_file("default.toml", "[session]\nsame_site = \"sometimes\"\n")?;
        assert!(AppConfig::load(".").is_err());
        Ok(())
    });
}

#[test]
fn test_token_ttl_out_of_range_is_rejected() {
    Jail::expect_with(|jail| {
        for days in ["0", "-3", "999999999999"] {
            jail.set_env("ICU_SESSION__TOKEN_TTL_DAYS", days);
            let err = AppConfig::load(".").unwrap_err();
            assert!(err.to_string().contains("session.token_ttl_days"), "{days}: {err}");
        }

        jail.set_env("ICU_SESSION__TOKEN_TTL_DAYS", "30");
        let config = AppConfig::load(".").map_err(|e| e.to_string())?;
        assert_eq!(config.session.token_ttl_days, 30);
        Ok(())
    });
}
