use chrono::Utc;
use rand::seq::IndexedRandom;
use rand::Rng;

/// Provides a realistic browser user-agent string.
pub trait UserAgentSource: Send + Sync {
    fn user_agent(&self) -> &str;
}

/// Current desktop browser agents.
const DESKTOP_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
];

const TIMEZONES: &[&str] = &["Europe/London", "America/New_York", "Asia/Tokyo"];
const LOCALES: &[&str] = &["en-US", "en-GB", "fr-FR"];

/// The one user-agent source: a uniform pick from [`DESKTOP_AGENTS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserAgents;

impl UserAgentSource for BrowserAgents {
    fn user_agent(&self) -> &str {
        DESKTOP_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(DESKTOP_AGENTS[0])
    }
}

/// Per-request client identity sent as query parameters and headers.
#[derive(Debug, Clone)]
pub struct ClientFingerprint {
    pub device_id: String,
    pub client_id: String,
    pub app_ver: String,
    pub tz_name: String,
    pub tz_offset: i32,
    pub app_lang: String,
    pub user_agent: String,
}

impl ClientFingerprint {
    pub fn random(agents: &dyn UserAgentSource) -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..12)
            .map(|_| char::from_digit(rng.random_range(0..16), 16).unwrap_or('0'))
            .collect();
        let app_ver = Utc::now().format("%Y.%m%d.%H%M%S").to_string();

        Self {
            device_id: format!("d66bea1d-c864-4955-adba-{suffix}"),
            client_id: format!("gmgn_web_{app_ver}"),
            app_ver,
            tz_name: pick(&mut rng, TIMEZONES).to_string(),
            tz_offset: rng.random_range(-12..=12),
            app_lang: pick(&mut rng, LOCALES).to_string(),
            user_agent: agents.user_agent().to_string(),
        }
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("device_id", self.device_id.clone()),
            ("client_id", self.client_id.clone()),
            ("from_app", "gmgn".to_string()),
            ("app_ver", self.app_ver.clone()),
            ("tz_name", self.tz_name.clone()),
            ("tz_offset", self.tz_offset.to_string()),
            ("app_lang", self.app_lang.clone()),
        ]
    }
}

fn pick<'a>(rng: &mut impl Rng, options: &[&'a str]) -> &'a str {
    options.choose(rng).copied().unwrap_or(options[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_fields_come_from_known_tables() {
        let fp = ClientFingerprint::random(&BrowserAgents);

        assert!(DESKTOP_AGENTS.contains(&fp.user_agent.as_str()));
        assert!(TIMEZONES.contains(&fp.tz_name.as_str()));
        assert!(LOCALES.contains(&fp.app_lang.as_str()));
        assert!((-12..=12).contains(&fp.tz_offset));

        let suffix = fp.device_id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp.client_id, format!("gmgn_web_{}", fp.app_ver));
    }

    #[test]
    fn query_params_carry_every_fingerprint_field() {
        let fp = ClientFingerprint::random(&BrowserAgents);
        let keys: Vec<_> = fp.query_params().into_iter().map(|(k, _)| k).collect();
        for key in ["device_id", "client_id", "app_ver", "tz_name", "tz_offset", "app_lang"] {
            assert!(keys.contains(&key), "missing {key}");
        }
    }
}
