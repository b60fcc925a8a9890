// WorkflowState - Per-workflow session state with explicit field reducers
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// State reducer strategy for merging a partial update into stored state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReducerStrategy {
    /// Replace old value with new value (default)
    Replace,
    /// Append new entries after existing ones (message log)
    Append,
    /// Keep the larger of the two values (monotonic counters)
    Max,
}

impl ReducerStrategy {
    pub fn reduce_scalar<T: PartialOrd>(self, slot: &mut T, incoming: Option<T>) {
        let Some(value) = incoming else {
            return;
        };
        match self {
            ReducerStrategy::Replace | ReducerStrategy::Append => *slot = value,
            ReducerStrategy::Max => {
                if value > *slot {
                    *slot = value;
                }
            }
        }
    }

    pub fn reduce_log<T>(self, log: &mut Vec<T>, incoming: Option<Vec<T>>) {
        let Some(entries) = incoming else {
            return;
        };
        match self {
            ReducerStrategy::Append => log.extend(entries),
            ReducerStrategy::Replace | ReducerStrategy::Max => *log = entries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl StateMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Behaviour shared by every workflow's state type.
///
/// A state is a fixed struct; its `Update` is the partial mapping a step returns,
/// merged field by field through `apply_update`.
pub trait WorkflowState:
    Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + std::fmt::Debug + 'static
{
    type Update: Clone
        + Default
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + std::fmt::Debug
        + 'static;

    /// Workflow name recorded alongside every checkpoint
    const WORKFLOW: &'static str;

    fn apply_update(&mut self, update: Self::Update);

    /// Patch built from the front end's first input for a session
    fn input_update(text: String) -> Self::Update;

    /// Patch built from human feedback at a review pause
    fn feedback_update(text: String) -> Self::Update;

    fn messages(&self) -> &[StateMessage];

    fn revision_count(&self) -> u32;

    fn human_feedback(&self) -> Option<&str>;
}

fn non_empty(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

// ---------------------------------------------------------------------------
// Travel planning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TravelState {
    pub location: String,
    pub weather: String,
    pub itinerary: String,
    pub human_feedback: String,
    pub revision_count: u32,
    pub messages: Vec<StateMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TravelUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub itinerary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<StateMessage>>,
}

impl TravelUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: StateMessage) -> Self {
        self.messages.get_or_insert_with(Vec::new).push(message);
        self
    }
}

impl WorkflowState for TravelState {
    type Update = TravelUpdate;

    const WORKFLOW: &'static str = "travel";

    fn apply_update(&mut self, update: TravelUpdate) {
        use ReducerStrategy::*;

        Replace.reduce_scalar(&mut self.location, update.location);
        Replace.reduce_scalar(&mut self.weather, update.weather);
        Replace.reduce_scalar(&mut self.itinerary, update.itinerary);
        Replace.reduce_scalar(&mut self.human_feedback, update.human_feedback);
        Max.reduce_scalar(&mut self.revision_count, update.revision_count);
        Append.reduce_log(&mut self.messages, update.messages);
    }

    fn input_update(text: String) -> TravelUpdate {
        TravelUpdate {
            location: Some(text.trim().to_string()),
            human_feedback: Some(String::new()),
            ..TravelUpdate::default()
        }
    }

    fn feedback_update(text: String) -> TravelUpdate {
        TravelUpdate {
            human_feedback: Some(text),
            ..TravelUpdate::default()
        }
    }

    fn messages(&self) -> &[StateMessage] {
        &self.messages
    }

    fn revision_count(&self) -> u32 {
        self.revision_count
    }

    fn human_feedback(&self) -> Option<&str> {
        non_empty(&self.human_feedback)
    }
}

// ---------------------------------------------------------------------------
// Career coaching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub raw_summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoachState {
    pub user_profile: Option<UserProfile>,
    pub gap_analysis: String,
    pub learning_plan: String,
    pub human_feedback: String,
    pub revision_count: u32,
    pub is_approved: bool,
    pub messages: Vec<StateMessage>,
}

impl CoachState {
    pub fn last_user_message(&self) -> Option<&StateMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoachUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<StateMessage>>,
}

impl CoachUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: StateMessage) -> Self {
        self.messages.get_or_insert_with(Vec::new).push(message);
        self
    }
}

impl WorkflowState for CoachState {
    type Update = CoachUpdate;

    const WORKFLOW: &'static str = "coach";

    fn apply_update(&mut self, update: CoachUpdate) {
        use ReducerStrategy::*;

        if let Some(profile) = update.user_profile {
            self.user_profile = Some(profile);
        }
        Replace.reduce_scalar(&mut self.gap_analysis, update.gap_analysis);
        Replace.reduce_scalar(&mut self.learning_plan, update.learning_plan);
        Replace.reduce_scalar(&mut self.human_feedback, update.human_feedback);
        Max.reduce_scalar(&mut self.revision_count, update.revision_count);
        Replace.reduce_scalar(&mut self.is_approved, update.is_approved);
        Append.reduce_log(&mut self.messages, update.messages);
    }

    fn input_update(text: String) -> CoachUpdate {
        CoachUpdate {
            human_feedback: Some(String::new()),
            is_approved: Some(false),
            ..CoachUpdate::default()
        }
        .with_message(StateMessage::user(text))
    }

    fn feedback_update(text: String) -> CoachUpdate {
        CoachUpdate {
            human_feedback: Some(text),
            ..CoachUpdate::default()
        }
    }

    fn messages(&self) -> &[StateMessage] {
        &self.messages
    }

    fn revision_count(&self) -> u32 {
        self.revision_count
    }

    fn human_feedback(&self) -> Option<&str> {
        non_empty(&self.human_feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_append_and_scalars_replace() {
        let mut state = TravelState::default();
        state.apply_update(
            TravelUpdate {
                itinerary: Some("day one".to_string()),
                ..TravelUpdate::default()
            }
            .with_message(StateMessage::assistant("first")),
        );
        state.apply_update(
            TravelUpdate {
                itinerary: Some("day one, revised".to_string()),
                ..TravelUpdate::default()
            }
            .with_message(StateMessage::assistant("second")),
        );

        assert_eq!(state.itinerary, "day one, revised");
        let contents: Vec<_> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn test_absent_fields_are_left_alone() {
        let mut state = CoachState {
            learning_plan: "plan".to_string(),
            is_approved: true,
            ..CoachState::default()
        };
        state.apply_update(CoachUpdate::new());

        assert_eq!(state.learning_plan, "plan");
        assert!(state.is_approved);
    }

    #[test]
    fn test_revision_count_never_decreases() {
        let mut state = CoachState {
            revision_count: 3,
            ..CoachState::default()
        };
        state.apply_update(CoachUpdate {
            revision_count: Some(1),
            ..CoachUpdate::default()
        });
        assert_eq!(state.revision_count, 3);

        state.apply_update(CoachUpdate {
            revision_count: Some(4),
            ..CoachUpdate::default()
        });
        assert_eq!(state.revision_count, 4);
    }

    #[test]
    fn test_empty_feedback_reads_as_absent() {
        let mut state = TravelState::default();
        assert_eq!(state.human_feedback(), None);

        state.apply_update(TravelState::feedback_update("  ".to_string()));
        assert_eq!(state.human_feedback(), None);

        state.apply_update(TravelState::feedback_update("more museums".to_string()));
        assert_eq!(state.human_feedback(), Some("more museums"));
    }

    #[test]
    fn test_last_user_message_skips_assistant_entries() {
        let mut state = CoachState::default();
        state.apply_update(CoachState::input_update("I want to be a data scientist".to_string()));
        state.apply_update(CoachUpdate::new().with_message(StateMessage::assistant("noted")));

        assert_eq!(
            state.last_user_message().map(|m| m.content.as_str()),
            Some("I want to be a data scientist")
        );
    }
}
