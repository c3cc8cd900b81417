//! Run status, platform and delivery-parameter types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Externally visible status of a discovery run.
///
/// Stored as the upper-case string returned by [`RunStatus::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    PendingPayment,
    Queued,
    FetchingLeads,
    AnalyzingLeads,
    Completed,
    Failed,
}

impl RunStatus {
    pub const ALL: [RunStatus; 6] = [
        RunStatus::PendingPayment,
        RunStatus::Queued,
        RunStatus::FetchingLeads,
        RunStatus::AnalyzingLeads,
        RunStatus::Completed,
        RunStatus::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::PendingPayment => "PENDING_PAYMENT",
            RunStatus::Queued => "QUEUED",
            RunStatus::FetchingLeads => "FETCHING_LEADS",
            RunStatus::AnalyzingLeads => "ANALYZING_LEADS",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }

    /// Position in the lifecycle. Both terminal states share the top rank.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            RunStatus::PendingPayment => 0,
            RunStatus::Queued => 1,
            RunStatus::FetchingLeads => 2,
            RunStatus::AnalyzingLeads => 3,
            RunStatus::Completed | RunStatus::Failed => 4,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Whether the orchestrator may pick the run up.
    #[must_use]
    pub fn is_runnable(self) -> bool {
        !matches!(self, RunStatus::PendingPayment)
    }

    /// Returns `true` when `self -> next` is an edge of the run state machine.
    #[must_use]
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::PendingPayment, RunStatus::Queued)
                | (
                    RunStatus::Queued,
                    RunStatus::FetchingLeads | RunStatus::Failed
                )
                | (
                    RunStatus::FetchingLeads,
                    RunStatus::AnalyzingLeads | RunStatus::Completed
                )
                | (RunStatus::AnalyzingLeads, RunStatus::Completed)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
    }
}

/// Content platform a run searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Reddit,
    HackerNews,
    Twitter,
    LinkedIn,
}

impl Platform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Reddit => "reddit",
            Platform::HackerNews => "hackernews",
            Platform::Twitter => "twitter",
            Platform::LinkedIn => "linkedin",
        }
    }

    /// Human-readable name used in delivery notifications.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Platform::Reddit => "Reddit",
            Platform::HackerNews => "Hacker News",
            Platform::Twitter => "X (Twitter)",
            Platform::LinkedIn => "LinkedIn",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Ok(Platform::Reddit),
            "hackernews" | "hacker_news" | "hn" => Ok(Platform::HackerNews),
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::LinkedIn),
            _ => Err(CoreError::UnknownPlatform(s.to_string())),
        }
    }
}

/// Resolved delivery bounds for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Posts older than this are never considered.
    pub max_age_days: u32,
    /// Upper bound on delivered leads.
    pub target_count: u32,
    /// Result cap requested from the connector for each query.
    pub posts_per_keyword_limit: u32,
}

/// Purchased lead tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadTier {
    Starter,
    Growth,
    Scale,
}

impl LeadTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LeadTier::Starter => "starter",
            LeadTier::Growth => "growth",
            LeadTier::Scale => "scale",
        }
    }

    #[must_use]
    pub fn parameters(self) -> RunParameters {
        match self {
            LeadTier::Starter => RunParameters {
                max_age_days: 30,
                target_count: 20,
                posts_per_keyword_limit: 25,
            },
            LeadTier::Growth => RunParameters {
                max_age_days: 90,
                target_count: 50,
                posts_per_keyword_limit: 50,
            },
            LeadTier::Scale => RunParameters {
                max_age_days: 365,
                target_count: 100,
                posts_per_keyword_limit: 100,
            },
        }
    }
}

impl FromStr for LeadTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(LeadTier::Starter),
            "growth" => Ok(LeadTier::Growth),
            "scale" => Ok(LeadTier::Scale),
            _ => Err(CoreError::UnknownLeadTier(s.to_string())),
        }
    }
}

/// Legacy time-window configuration, still accepted for older runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Week,
    Month,
    Quarter,
}

impl TimeWindow {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Quarter => "quarter",
        }
    }

    #[must_use]
    pub fn parameters(self) -> RunParameters {
        match self {
            TimeWindow::Week => RunParameters {
                max_age_days: 7,
                target_count: 20,
                posts_per_keyword_limit: 25,
            },
            TimeWindow::Month => RunParameters {
                max_age_days: 30,
                target_count: 30,
                posts_per_keyword_limit: 50,
            },
            TimeWindow::Quarter => RunParameters {
                max_age_days: 90,
                target_count: 50,
                posts_per_keyword_limit: 75,
            },
        }
    }
}

impl FromStr for TimeWindow {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(TimeWindow::Week),
            "month" => Ok(TimeWindow::Month),
            "quarter" => Ok(TimeWindow::Quarter),
            _ => Err(CoreError::UnknownTimeWindow(s.to_string())),
        }
    }
}

/// Exactly one of a lead tier or a time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConfiguration {
    Tier(LeadTier),
    Window(TimeWindow),
}

impl RunConfiguration {
    /// Build from the two nullable storage columns.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AmbiguousConfiguration`] unless exactly one side is
    /// set, or an unknown-value error if the set side does not parse.
    pub fn from_columns(
        lead_tier: Option<&str>,
        time_window: Option<&str>,
    ) -> Result<Self, CoreError> {
        match (lead_tier, time_window) {
            (Some(tier), None) => Ok(RunConfiguration::Tier(tier.parse()?)),
            (None, Some(window)) => Ok(RunConfiguration::Window(window.parse()?)),
            _ => Err(CoreError::AmbiguousConfiguration),
        }
    }

    #[must_use]
    pub fn resolve(self) -> RunParameters {
        match self {
            RunConfiguration::Tier(tier) => tier.parameters(),
            RunConfiguration::Window(window) => window.parameters(),
        }
    }

    #[must_use]
    pub fn lead_tier(self) -> Option<LeadTier> {
        match self {
            RunConfiguration::Tier(tier) => Some(tier),
            RunConfiguration::Window(_) => None,
        }
    }

    #[must_use]
    pub fn time_window(self) -> Option<TimeWindow> {
        match self {
            RunConfiguration::Tier(_) => None,
            RunConfiguration::Window(window) => Some(window),
        }
    }
}
