use std::{env, fs, path::Path, time::Duration};

use crate::{
    domain::UserId,
    errors::Error,
    menu::{MenuOptions, DEFAULT_TIMEOUT},
    messaging::types::ParseMode,
    Result,
};

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    /// Empty means every user may interact with the bot.
    pub telegram_allowed_users: Vec<i64>,

    // Menu defaults
    pub menu_timeout: Duration,
    pub menu_stale_text: String,
    pub menu_timeout_text: String,
    pub menu_parse_mode: ParseMode,
    pub start_menu: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `load()` uses the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = lookup("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let telegram_allowed_users = parse_csv_i64(lookup("TELEGRAM_ALLOWED_USERS"));

        let defaults = MenuOptions::default();
        let menu_timeout = lookup("MENU_TIMEOUT_MS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);
        let menu_stale_text = lookup("MENU_STALE_TEXT")
            .and_then(non_empty)
            .unwrap_or(defaults.stale_message_text);
        let menu_timeout_text = lookup("MENU_TIMEOUT_TEXT")
            .and_then(non_empty)
            .unwrap_or(defaults.timeout_message_text);
        let menu_parse_mode = match lookup("MENU_PARSE_MODE").and_then(non_empty) {
            Some(raw) => raw.parse::<ParseMode>().map_err(Error::Config)?,
            None => defaults.parse_mode,
        };
        let start_menu = lookup("MENU_START")
            .and_then(non_empty)
            .unwrap_or_else(|| "main".to_string());

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            menu_timeout,
            menu_stale_text,
            menu_timeout_text,
            menu_parse_mode,
            start_menu,
        })
    }

    /// Default options for menus built by the integrator.
    pub fn menu_options(&self) -> MenuOptions {
        MenuOptions {
            stale_message_text: self.menu_stale_text.clone(),
            timeout_message_text: self.menu_timeout_text.clone(),
            timeout: self.menu_timeout,
            parse_mode: self.menu_parse_mode,
        }
    }

    pub fn is_authorized(&self, user_id: Option<UserId>) -> bool {
        if self.telegram_allowed_users.is_empty() {
            return true;
        }
        user_id.is_some_and(|u| self.telegram_allowed_users.contains(&u.0))
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        let mut val = v.trim();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }

        env::set_var(key, val);
    }
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults_match_menu_defaults() {
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t")])).unwrap();
        let opts = cfg.menu_options();
        let defaults = MenuOptions::default();
        assert_eq!(opts.timeout, Duration::from_millis(10_000));
        assert_eq!(opts.stale_message_text, defaults.stale_message_text);
        assert_eq!(opts.timeout_message_text, defaults.timeout_message_text);
        assert_eq!(opts.parse_mode, ParseMode::Html);
        assert_eq!(cfg.start_menu, "main");
        assert!(cfg.is_authorized(None));
    }

    #[test]
    fn reads_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_ALLOWED_USERS", "1, 2,x"),
            ("MENU_TIMEOUT_MS", "250"),
            ("MENU_STALE_TEXT", "old menu"),
            ("MENU_TIMEOUT_TEXT", "slow"),
            ("MENU_PARSE_MODE", "MarkdownV2"),
            ("MENU_START", "home"),
        ]))
        .unwrap();

        assert_eq!(cfg.telegram_allowed_users, vec![1, 2]);
        assert_eq!(cfg.menu_timeout, Duration::from_millis(250));
        assert_eq!(cfg.menu_stale_text, "old menu");
        assert_eq!(cfg.menu_timeout_text, "slow");
        assert_eq!(cfg.menu_parse_mode, ParseMode::MarkdownV2);
        assert_eq!(cfg.start_menu, "home");
        assert!(cfg.is_authorized(Some(UserId(2))));
        assert!(!cfg.is_authorized(Some(UserId(3))));
        assert!(!cfg.is_authorized(None));
    }

    #[test]
    fn rejects_unknown_parse_mode() {
        let err = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("MENU_PARSE_MODE", "bbcode"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("bbcode"));
    }
}
