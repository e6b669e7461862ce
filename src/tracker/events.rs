use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Browser lifecycle signal delivered to the tracker. The serde shape doubles
/// as the stdin wire format the extension shim emits, one json object per
/// line, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BrowserEvent {
    /// The active tab changed. `window_minimized` reflects the state of the
    /// tab's window at the moment of activation.
    #[serde(rename_all = "camelCase")]
    TabActivated {
        url: Option<String>,
        #[serde(default)]
        window_minimized: bool,
    },
    /// The active tab navigated to a new url.
    #[serde(rename_all = "camelCase")]
    TabNavigated { url: String },
    /// Browser-wide focus changed. On focus gain the shim includes the url of
    /// the newly focused window's active tab.
    #[serde(rename_all = "camelCase")]
    WindowFocusChanged {
        focused: bool,
        #[serde(default)]
        active_url: Option<String>,
    },
    /// Settings surface changed which platforms are enabled.
    #[serde(rename_all = "camelCase")]
    UpdateEnabledPlatforms {
        enabled_platforms: HashMap<String, bool>,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::BrowserEvent;

    #[test]
    fn tab_activated_decodes() {
        let event: BrowserEvent = serde_json::from_str(
            r#"{"type":"tabActivated","url":"https://youtube.com/","windowMinimized":false}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            BrowserEvent::TabActivated {
                url: Some("https://youtube.com/".into()),
                window_minimized: false,
            }
        );
    }

    #[test]
    fn tab_activated_fields_default_when_absent() {
        let event: BrowserEvent =
            serde_json::from_str(r#"{"type":"tabActivated","url":null}"#).unwrap();
        assert_eq!(
            event,
            BrowserEvent::TabActivated {
                url: None,
                window_minimized: false,
            }
        );
    }

    #[test]
    fn tab_navigated_decodes() {
        let event: BrowserEvent =
            serde_json::from_str(r#"{"type":"tabNavigated","url":"https://x.com/home"}"#).unwrap();
        assert_eq!(
            event,
            BrowserEvent::TabNavigated {
                url: "https://x.com/home".into()
            }
        );
    }

    #[test]
    fn window_focus_changed_decodes() {
        let event: BrowserEvent = serde_json::from_str(
            r#"{"type":"windowFocusChanged","focused":true,"activeUrl":"https://reddit.com/"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            BrowserEvent::WindowFocusChanged {
                focused: true,
                active_url: Some("https://reddit.com/".into()),
            }
        );
    }

    #[test]
    fn update_enabled_platforms_decodes() {
        let event: BrowserEvent = serde_json::from_str(
            r#"{"type":"updateEnabledPlatforms","enabledPlatforms":{"youtube.com":false,"x.com":true}}"#,
        )
        .unwrap();
        let mut expected = HashMap::new();
        expected.insert("youtube.com".to_string(), false);
        expected.insert("x.com".to_string(), true);
        assert_eq!(
            event,
            BrowserEvent::UpdateEnabledPlatforms {
                enabled_platforms: expected
            }
        );
    }

    #[test]
    fn unknown_message_type_is_an_error() {
        assert!(serde_json::from_str::<BrowserEvent>(r#"{"type":"somethingElse"}"#).is_err());
    }
}
