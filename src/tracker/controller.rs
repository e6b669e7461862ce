use std::{collections::HashMap, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    storage::{
        entities::{Settings, SiteTime},
        state_store::StateStore,
    },
    utils::clock::Clock,
};

use super::{
    events::BrowserEvent,
    sites::{self, TrackedSite},
};

/// How accumulated-but-not-yet-whole minutes behave when a flush advances the
/// session start. The browser extension this replaces advanced to `now`,
/// dropping the sub-minute remainder on every flush; `Carry` keeps it so many
/// short sessions don't systematically undercount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RemainderPolicy {
    #[default]
    Discard,
    Carry,
}

impl std::fmt::Display for RemainderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Discard => "discard",
            Self::Carry => "carry",
        })
    }
}

const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Last-known foreground tab. Kept so a settings change can re-evaluate what
/// should be tracked without querying the browser.
#[derive(Debug, Default)]
struct ForegroundTab {
    url: Option<String>,
    /// False while the window is minimized or the browser has lost focus.
    eligible: bool,
}

/// The accumulation state machine. At any instant at most one site is being
/// tracked; wall-clock time flows into its persisted total in whole minutes,
/// and leaving the tracking state never skips the final flush.
///
/// All methods are called from a single task, so interleaving between a flush
/// tick and a lifecycle event is decided by the event loop, never by parallel
/// access.
pub struct TrackingController<S> {
    store: S,
    clock: Box<dyn Clock>,
    remainder: RemainderPolicy,
    enabled_platforms: HashMap<String, bool>,
    current_site: Option<&'static TrackedSite>,
    last_flush: DateTime<Utc>,
    flush_deadline: Option<Instant>,
    flush_interval: Duration,
    foreground: ForegroundTab,
}

impl<S: StateStore> TrackingController<S> {
    /// Loads persisted settings, writing compiled-in defaults on first start.
    pub async fn new(store: S, clock: Box<dyn Clock>, remainder: RemainderPolicy) -> Result<Self> {
        let settings = match store.load_settings().await? {
            Some(v) => v,
            None => {
                info!("No persisted settings found, initializing defaults");
                let defaults = Settings::default();
                store.save_settings(&defaults).await?;
                defaults
            }
        };

        let last_flush = clock.time();
        Ok(Self {
            store,
            clock,
            remainder,
            enabled_platforms: settings.enabled_platforms,
            current_site: None,
            last_flush,
            flush_deadline: None,
            flush_interval: FLUSH_INTERVAL,
            foreground: ForegroundTab::default(),
        })
    }

    /// Returns the tracked site a url belongs to, provided the user has the
    /// platform enabled. Unparsable urls resolve to none.
    pub fn resolve_tracked_site(&self, url: &str) -> Option<&'static TrackedSite> {
        let parsed = Url::parse(url).ok()?;
        let site = sites::find_by_host(parsed.host_str()?)?;
        self.enabled_platforms
            .get(site.hostname)
            .copied()
            .unwrap_or(false)
            .then_some(site)
    }

    pub async fn handle_event(&mut self, event: BrowserEvent) -> Result<()> {
        debug!("Handling event {event:?}");
        match event {
            BrowserEvent::TabActivated {
                url,
                window_minimized,
            } => {
                self.foreground = ForegroundTab {
                    url,
                    eligible: !window_minimized,
                };
                self.reevaluate_foreground().await
            }
            BrowserEvent::TabNavigated { url } => {
                self.foreground.url = Some(url);
                self.reevaluate_foreground().await
            }
            BrowserEvent::WindowFocusChanged {
                focused,
                active_url,
            } => {
                if focused {
                    self.foreground = ForegroundTab {
                        url: active_url,
                        eligible: true,
                    };
                } else {
                    self.foreground.eligible = false;
                }
                self.reevaluate_foreground().await
            }
            BrowserEvent::UpdateEnabledPlatforms { enabled_platforms } => {
                self.on_enabled_platforms_changed(enabled_platforms).await
            }
        }
    }

    /// Replaces the enablement map and immediately re-evaluates the foreground
    /// tab, so a disabled platform stops accumulating right away.
    pub async fn on_enabled_platforms_changed(
        &mut self,
        enabled_platforms: HashMap<String, bool>,
    ) -> Result<()> {
        self.enabled_platforms = enabled_platforms;
        self.reevaluate_foreground().await
    }

    async fn reevaluate_foreground(&mut self) -> Result<()> {
        let target = if self.foreground.eligible {
            self.foreground
                .url
                .as_deref()
                .and_then(|url| self.resolve_tracked_site(url))
        } else {
            None
        };
        self.start_tracking(target).await
    }

    /// Switches the session to `site`. Redundant calls with the currently
    /// tracked site are a no-op so a repeated event doesn't reset the flush
    /// timer.
    pub async fn start_tracking(&mut self, site: Option<&'static TrackedSite>) -> Result<()> {
        if self.current_site.map(|s| s.hostname) == site.map(|s| s.hostname) {
            return Ok(());
        }

        let stop_result = self.stop_tracking().await;

        self.current_site = site;
        self.last_flush = self.clock.time();
        if let Some(site) = site {
            info!("Started tracking {}", site.hostname);
            self.flush_deadline = Some(self.clock.instant() + self.flush_interval);
        }

        // The new session is armed even if the closing flush of the previous
        // one failed; that error still surfaces to the event loop.
        stop_result
    }

    /// Ends the current session, flushing trailing whole minutes first.
    pub async fn stop_tracking(&mut self) -> Result<()> {
        self.flush_deadline = None;
        let result = match self.current_site {
            Some(site) => {
                let flushed = self.flush().await;
                info!("Stopped tracking {}", site.hostname);
                flushed
            }
            None => Ok(()),
        };
        self.current_site = None;
        result
    }

    /// Converts elapsed wall-clock time into persisted whole minutes. Nothing
    /// is written while less than a minute has accumulated. On a storage
    /// failure `last_flush` stays put, so the next cycle retries the same
    /// elapsed span.
    pub async fn flush(&mut self) -> Result<()> {
        let Some(site) = self.current_site else {
            return Ok(());
        };

        let now = self.clock.time();
        let elapsed_minutes = (now - self.last_flush).num_minutes();
        if elapsed_minutes < 1 {
            return Ok(());
        }

        let mut data = self.store.load_time_data().await?;
        let entry = data.entry(site.hostname.to_string()).or_insert(SiteTime {
            name: site.display_name.to_string(),
            total_minutes: 0,
        });
        entry.total_minutes += elapsed_minutes as u64;
        self.store.save_time_data(&data).await?;

        debug!(
            "Flushed {elapsed_minutes} minute(s) for {}, total {}",
            site.hostname,
            data[site.hostname].total_minutes
        );

        self.last_flush = match self.remainder {
            RemainderPolicy::Discard => now,
            RemainderPolicy::Carry => self.last_flush + chrono::Duration::minutes(elapsed_minutes),
        };
        Ok(())
    }

    /// Periodic timer fired. The deadline advances even when the flush fails,
    /// matching the no-retry-queue policy: the next tick simply tries again.
    pub async fn tick(&mut self) -> Result<()> {
        if let Some(deadline) = self.flush_deadline {
            self.flush_deadline = Some(deadline + self.flush_interval);
        } else {
            warn!("Flush tick fired without an active session");
        }
        self.flush().await
    }

    /// The next instant the periodic flush should run, present only while a
    /// session is active.
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.flush_deadline
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anyhow::Result;
    use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use crate::{
        storage::{entities::Settings, state_store::StateStore, testing::MemoryStore},
        tracker::events::BrowserEvent,
        utils::clock::ManualClock,
    };

    use super::{RemainderPolicy, TrackingController};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn test_start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    async fn controller(
        remainder: RemainderPolicy,
    ) -> Result<(TrackingController<MemoryStore>, MemoryStore, ManualClock)> {
        let store = MemoryStore::default();
        let clock = ManualClock::new(test_start());
        let controller =
            TrackingController::new(store.clone(), Box::new(clock.clone()), remainder).await?;
        Ok((controller, store, clock))
    }

    fn activated(url: &str) -> BrowserEvent {
        BrowserEvent::TabActivated {
            url: Some(url.into()),
            window_minimized: false,
        }
    }

    #[tokio::test]
    async fn first_start_persists_default_settings() -> Result<()> {
        let (_, store, _) = controller(RemainderPolicy::Discard).await?;
        assert_eq!(store.settings(), Some(Settings::default()));
        Ok(())
    }

    #[tokio::test]
    async fn persisted_settings_are_not_overwritten_at_startup() -> Result<()> {
        let store = MemoryStore::default();
        let mut settings = Settings::default();
        settings.enabled_platforms.insert("youtube.com".into(), false);
        store.save_settings(&settings).await?;

        let clock = ManualClock::new(test_start());
        let tracker = TrackingController::new(
            store.clone(),
            Box::new(clock),
            RemainderPolicy::Discard,
        )
        .await?;

        assert_eq!(store.settings(), Some(settings));
        assert_eq!(tracker.resolve_tracked_site("https://youtube.com/"), None);
        Ok(())
    }

    #[tokio::test]
    async fn resolution_rejects_untracked_and_malformed_urls() -> Result<()> {
        let (tracker, _, _) = controller(RemainderPolicy::Discard).await?;

        assert_eq!(tracker.resolve_tracked_site("https://example.com/page"), None);
        assert_eq!(tracker.resolve_tracked_site("not a url at all"), None);
        assert_eq!(tracker.resolve_tracked_site(""), None);
        assert_eq!(
            tracker
                .resolve_tracked_site("https://www.youtube.com/watch?v=a")
                .unwrap()
                .hostname,
            "youtube.com"
        );
        Ok(())
    }

    #[tokio::test]
    async fn resolution_respects_platform_enablement() -> Result<()> {
        let (mut tracker, _, _) = controller(RemainderPolicy::Discard).await?;

        let mut map = HashMap::new();
        map.insert("youtube.com".to_string(), false);
        tracker.on_enabled_platforms_changed(map).await?;

        assert_eq!(tracker.resolve_tracked_site("https://youtube.com/"), None);
        // A hostname missing from the map counts as disabled.
        assert_eq!(tracker.resolve_tracked_site("https://reddit.com/"), None);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_start_does_not_reset_the_session() -> Result<()> {
        let (mut tracker, _, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        let first_flush_mark = tracker.last_flush;
        let first_deadline = tracker.flush_deadline();

        clock.advance(Duration::seconds(30));
        tracker
            .handle_event(activated("https://www.youtube.com/watch?v=b"))
            .await?;

        assert_eq!(tracker.last_flush, first_flush_mark);
        assert_eq!(tracker.flush_deadline(), first_deadline);
        Ok(())
    }

    #[tokio::test]
    async fn accumulation_is_exact_whole_minutes() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        clock.advance(Duration::minutes(25));
        tracker.flush().await?;

        assert_eq!(store.total_minutes("youtube.com"), 25);
        assert_eq!(store.time_data()["youtube.com"].name, "YouTube");
        Ok(())
    }

    #[tokio::test]
    async fn sub_minute_elapsed_time_is_not_persisted() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        let mark = tracker.last_flush;
        clock.advance(Duration::seconds(59));
        tracker.flush().await?;

        assert!(store.time_data().is_empty());
        assert_eq!(tracker.last_flush, mark);
        Ok(())
    }

    #[tokio::test]
    async fn switching_sites_flushes_the_old_site_only() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        clock.advance(Duration::minutes(5));
        tracker.handle_event(activated("https://reddit.com/")).await?;

        assert_eq!(store.total_minutes("youtube.com"), 5);
        assert_eq!(store.total_minutes("reddit.com"), 0);

        clock.advance(Duration::minutes(3));
        tracker.flush().await?;
        assert_eq!(store.total_minutes("youtube.com"), 5);
        assert_eq!(store.total_minutes("reddit.com"), 3);
        Ok(())
    }

    #[tokio::test]
    async fn focus_loss_stops_accumulation() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        clock.advance(Duration::minutes(2));
        tracker
            .handle_event(BrowserEvent::WindowFocusChanged {
                focused: false,
                active_url: None,
            })
            .await?;

        assert_eq!(store.total_minutes("youtube.com"), 2);
        assert_eq!(tracker.flush_deadline(), None);

        // Time passing while unfocused accrues nothing.
        clock.advance(Duration::minutes(30));
        tracker.flush().await?;
        assert_eq!(store.total_minutes("youtube.com"), 2);
        Ok(())
    }

    #[tokio::test]
    async fn focus_gain_resumes_from_the_active_tab() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        tracker
            .handle_event(BrowserEvent::WindowFocusChanged {
                focused: false,
                active_url: None,
            })
            .await?;
        clock.advance(Duration::minutes(10));
        tracker
            .handle_event(BrowserEvent::WindowFocusChanged {
                focused: true,
                active_url: Some("https://youtube.com/feed".into()),
            })
            .await?;

        clock.advance(Duration::minutes(4));
        tracker.flush().await?;
        assert_eq!(store.total_minutes("youtube.com"), 4);
        Ok(())
    }

    #[tokio::test]
    async fn minimized_window_stops_tracking() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        clock.advance(Duration::minutes(1));
        tracker
            .handle_event(BrowserEvent::TabActivated {
                url: Some("https://youtube.com/".into()),
                window_minimized: true,
            })
            .await?;

        assert_eq!(store.total_minutes("youtube.com"), 1);
        assert_eq!(tracker.flush_deadline(), None);
        Ok(())
    }

    #[tokio::test]
    async fn navigation_while_unfocused_does_not_resume() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        tracker
            .handle_event(BrowserEvent::WindowFocusChanged {
                focused: false,
                active_url: None,
            })
            .await?;
        tracker
            .handle_event(BrowserEvent::TabNavigated {
                url: "https://reddit.com/".into(),
            })
            .await?;

        clock.advance(Duration::minutes(5));
        tracker.flush().await?;
        assert_eq!(store.total_minutes("reddit.com"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn disabling_the_tracked_platform_stops_it_immediately() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        clock.advance(Duration::minutes(2));

        let mut map = HashMap::new();
        map.insert("youtube.com".to_string(), false);
        tracker
            .handle_event(BrowserEvent::UpdateEnabledPlatforms {
                enabled_platforms: map,
            })
            .await?;

        // The disable itself flushed the session, and nothing accrues after.
        assert_eq!(store.total_minutes("youtube.com"), 2);
        clock.advance(Duration::minutes(10));
        tracker.flush().await?;
        assert_eq!(store.total_minutes("youtube.com"), 2);
        Ok(())
    }

    #[tokio::test]
    async fn enabling_a_platform_picks_up_the_foreground_tab() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        let mut map = HashMap::new();
        map.insert("reddit.com".to_string(), false);
        tracker.on_enabled_platforms_changed(map).await?;

        tracker.handle_event(activated("https://reddit.com/")).await?;
        assert_eq!(tracker.flush_deadline(), None);

        let mut map = HashMap::new();
        map.insert("reddit.com".to_string(), true);
        tracker
            .handle_event(BrowserEvent::UpdateEnabledPlatforms {
                enabled_platforms: map,
            })
            .await?;

        clock.advance(Duration::minutes(3));
        tracker.flush().await?;
        assert_eq!(store.total_minutes("reddit.com"), 3);
        Ok(())
    }

    #[tokio::test]
    async fn periodic_ticks_accumulate_one_minute_per_sixty_seconds() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        let mut map = HashMap::new();
        map.insert("youtube.com".to_string(), true);
        map.insert("reddit.com".to_string(), false);
        tracker.on_enabled_platforms_changed(map).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        for _ in 0..9 {
            clock.advance(Duration::seconds(10));
            tracker.tick().await?;
        }
        assert_eq!(store.total_minutes("youtube.com"), 1);

        // Switching to a disabled site ends the session; the old total stays.
        tracker.handle_event(activated("https://reddit.com/")).await?;
        clock.advance(Duration::minutes(5));
        tracker.flush().await?;
        assert_eq!(store.total_minutes("youtube.com"), 1);
        assert_eq!(store.total_minutes("reddit.com"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn discard_policy_drops_the_sub_minute_remainder() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        clock.advance(Duration::seconds(90));
        tracker.flush().await?;
        clock.advance(Duration::seconds(30));
        tracker.flush().await?;

        assert_eq!(store.total_minutes("youtube.com"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn carry_policy_preserves_the_sub_minute_remainder() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Carry).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        clock.advance(Duration::seconds(90));
        tracker.flush().await?;
        assert_eq!(store.total_minutes("youtube.com"), 1);

        clock.advance(Duration::seconds(30));
        tracker.flush().await?;
        assert_eq!(store.total_minutes("youtube.com"), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_flush_retries_the_same_span_next_cycle() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        clock.advance(Duration::minutes(5));

        store.fail_writes(true);
        assert!(tracker.flush().await.is_err());
        assert_eq!(store.total_minutes("youtube.com"), 0);

        store.fail_writes(false);
        tracker.flush().await?;
        assert_eq!(store.total_minutes("youtube.com"), 5);
        Ok(())
    }

    #[tokio::test]
    async fn tick_advances_the_deadline_even_when_the_flush_fails() -> Result<()> {
        let (mut tracker, store, clock) = controller(RemainderPolicy::Discard).await?;

        tracker.handle_event(activated("https://youtube.com/")).await?;
        let before = tracker.flush_deadline().unwrap();

        clock.advance(Duration::minutes(1));
        store.fail_writes(true);
        assert!(tracker.tick().await.is_err());

        assert_eq!(
            tracker.flush_deadline().unwrap(),
            before + super::FLUSH_INTERVAL
        );
        Ok(())
    }
}
