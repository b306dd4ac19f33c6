//! URL-navigation trigger.
//!
//! Fires when a top-frame navigation commits to a URL matching one of the
//! trigger's patterns. Sub-frame navigations never fire.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::TriggerError;
use crate::platform::TabsApi;
use crate::traits::{FireHandler, TriggerHandler};
use crate::types::{
    TriggerConfig, TriggerFireContext, TriggerKind, TriggerSpec, UrlPattern, UrlPatternKind,
};

/// Split `url` into (host, path). The host is lowercased with any port
/// stripped; the path always starts with `/`.
fn split_url(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let host = authority
        .split('@')
        .next_back()
        .unwrap_or(authority)
        .split(':')
        .next()
        .unwrap_or(authority)
        .to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }
    // Query and fragment are not part of the path for matching purposes.
    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or(path)
        .to_string();
    Some((host, path))
}

/// Whether `url` matches `pattern`.
pub fn url_matches(url: &str, pattern: &UrlPattern) -> bool {
    match pattern.kind {
        UrlPatternKind::Domain => match split_url(url) {
            Some((host, _)) => {
                let wanted = pattern.value.to_ascii_lowercase();
                host == wanted || host.ends_with(&format!(".{wanted}"))
            }
            None => false,
        },
        UrlPatternKind::Path => match split_url(url) {
            Some((_, path)) => path.starts_with(&pattern.value),
            None => false,
        },
        UrlPatternKind::Url => url.starts_with(&pattern.value),
    }
}

pub struct UrlTriggerHandler {
    tabs: Arc<dyn TabsApi>,
    fire: Arc<dyn FireHandler>,
    installed: Mutex<BTreeMap<String, Vec<UrlPattern>>>,
}

impl UrlTriggerHandler {
    pub fn new(tabs: Arc<dyn TabsApi>, fire: Arc<dyn FireHandler>) -> Self {
        Self {
            tabs,
            fire,
            installed: Mutex::new(BTreeMap::new()),
        }
    }

    /// Entry point for a committed navigation. Only the top frame
    /// (`frame_id == 0`) is considered.
    pub async fn handle_navigation(
        &self,
        tab_id: i64,
        url: &str,
        frame_id: i64,
    ) -> Result<(), TriggerError> {
        if frame_id != 0 {
            return Ok(());
        }

        let matching: Vec<String> = {
            let installed = self.installed.lock().await;
            installed
                .iter()
                .filter(|(_, patterns)| patterns.iter().any(|p| url_matches(url, p)))
                .map(|(id, _)| id.clone())
                .collect()
        };
        for trigger_id in matching {
            let ctx = TriggerFireContext {
                source_tab_id: Some(tab_id),
                source_url: Some(url.to_string()),
            };
            if let Err(error) = self.fire.on_fire(&trigger_id, ctx).await {
                warn!(trigger_id = %trigger_id, %error, "url trigger fire failed");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerHandler for UrlTriggerHandler {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Url
    }

    async fn install(&self, spec: &TriggerSpec) -> Result<(), TriggerError> {
        let patterns = match &spec.config {
            TriggerConfig::Url { patterns } => patterns,
            other => {
                return Err(TriggerError::Config {
                    message: format!("expected url config, got {}", other.kind()),
                })
            }
        };
        if patterns.is_empty() {
            return Err(TriggerError::Config {
                message: "url trigger needs at least one pattern".into(),
            });
        }
        if let Some(empty) = patterns.iter().find(|p| p.value.trim().is_empty()) {
            return Err(TriggerError::Config {
                message: format!("empty {:?} pattern value", empty.kind),
            });
        }

        let mut installed = self.installed.lock().await;
        if installed.is_empty() {
            self.tabs.add_navigation_listener();
        }
        installed.insert(spec.id.clone(), patterns.clone());
        Ok(())
    }

    async fn uninstall(&self, id: &str) -> Result<(), TriggerError> {
        let mut installed = self.installed.lock().await;
        if installed.remove(id).is_some() && installed.is_empty() {
            self.tabs.remove_navigation_listener();
        }
        Ok(())
    }

    async fn uninstall_all(&self) -> Result<(), TriggerError> {
        let mut installed = self.installed.lock().await;
        if !installed.is_empty() {
            installed.clear();
            self.tabs.remove_navigation_listener();
        }
        Ok(())
    }

    async fn installed_ids(&self) -> Vec<String> {
        self.installed.lock().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::testing::{MockTabsApi, RecordingFireHandler};
    use std::sync::atomic::Ordering;

    fn pattern(kind: UrlPatternKind, value: &str) -> UrlPattern {
        UrlPattern {
            kind,
            value: value.into(),
        }
    }

    fn url_spec(id: &str, patterns: Vec<UrlPattern>) -> TriggerSpec {
        TriggerSpec {
            id: id.into(),
            enabled: true,
            flow_id: "flow-1".into(),
            args: None,
            config: TriggerConfig::Url { patterns },
        }
    }

    fn handler() -> (UrlTriggerHandler, Arc<MockTabsApi>, Arc<RecordingFireHandler>) {
        let tabs = Arc::new(MockTabsApi::default());
        let fire = Arc::new(RecordingFireHandler::default());
        let handler = UrlTriggerHandler::new(
            Arc::clone(&tabs) as Arc<dyn TabsApi>,
            Arc::clone(&fire) as Arc<dyn FireHandler>,
        );
        (handler, tabs, fire)
    }

    #[test]
    fn domain_matching() {
        let p = pattern(UrlPatternKind::Domain, "example.com");
        assert!(url_matches("https://example.com/x", &p));
        assert!(url_matches("https://shop.example.com/", &p));
        assert!(url_matches("http://EXAMPLE.com", &p));
        assert!(url_matches("https://example.com:8443/x", &p));
        assert!(!url_matches("https://notexample.com/", &p));
        assert!(!url_matches("https://example.com.evil.io/", &p));
        assert!(!url_matches("chrome://example.com", &p));
    }

    #[test]
    fn path_matching() {
        let p = pattern(UrlPatternKind::Path, "/checkout");
        assert!(url_matches("https://a.com/checkout", &p));
        assert!(url_matches("https://b.org/checkout/step2", &p));
        assert!(url_matches("https://a.com/checkout?step=1", &p));
        assert!(!url_matches("https://a.com/cart", &p));
        assert!(!url_matches("https://a.com", &pattern(UrlPatternKind::Path, "/x")));
    }

    #[test]
    fn url_prefix_matching() {
        let p = pattern(UrlPatternKind::Url, "https://example.com/checkout");
        assert!(url_matches("https://example.com/checkout?step=1", &p));
        assert!(!url_matches("https://example.com/cart", &p));
    }

    #[tokio::test]
    async fn navigation_fires_matching_triggers() {
        let (handler, _, fire) = handler();
        handler
            .install(&url_spec(
                "t-dom",
                vec![pattern(UrlPatternKind::Domain, "example.com")],
            ))
            .await
            .unwrap();
        handler
            .install(&url_spec(
                "t-path",
                vec![pattern(UrlPatternKind::Path, "/admin")],
            ))
            .await
            .unwrap();

        handler
            .handle_navigation(3, "https://example.com/checkout", 0)
            .await
            .unwrap();

        let fires = fire.fires.lock();
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].0, "t-dom");
        assert_eq!(fires[0].1.source_tab_id, Some(3));
        assert_eq!(
            fires[0].1.source_url.as_deref(),
            Some("https://example.com/checkout")
        );
    }

    #[tokio::test]
    async fn sub_frame_navigations_never_fire() {
        let (handler, _, fire) = handler();
        handler
            .install(&url_spec(
                "t-1",
                vec![pattern(UrlPatternKind::Domain, "example.com")],
            ))
            .await
            .unwrap();

        handler
            .handle_navigation(3, "https://example.com/", 2)
            .await
            .unwrap();
        assert!(fire.fired_ids().is_empty());
    }

    #[tokio::test]
    async fn empty_patterns_rejected() {
        let (handler, tabs, _) = handler();
        let err = handler.install(&url_spec("t-1", vec![])).await.unwrap_err();
        assert!(matches!(err, TriggerError::Config { .. }));
        assert_eq!(tabs.navigation_listener_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listener_refcount() {
        let (handler, tabs, _) = handler();
        handler
            .install(&url_spec("t-1", vec![pattern(UrlPatternKind::Path, "/a")]))
            .await
            .unwrap();
        handler
            .install(&url_spec("t-2", vec![pattern(UrlPatternKind::Path, "/b")]))
            .await
            .unwrap();
        assert_eq!(tabs.navigation_listener_count.load(Ordering::SeqCst), 1);

        handler.uninstall_all().await.unwrap();
        assert_eq!(tabs.navigation_listener_count.load(Ordering::SeqCst), 0);
    }
}
