// Travel planning workflow - itinerary drafting, weather adjustment and human review
use super::checkpoint::CheckpointStore;
use super::error::WorkflowError;
use super::executor::{ExecutorBuilder, ExecutorConfig, WorkflowExecutor};
use super::graph::{NodeFunction, NodeType, StateGraph, StateGraphBuilder, Target};
use super::router::{travel_review_route, weather_route, TravelReviewRoute, WeatherRoute};
use super::state::{StateMessage, TravelState, TravelUpdate, WorkflowState};
use crate::capabilities::{TextCompletion, WeatherLookup, WeatherReport};
use crate::services::execution_log::ExecutionRecorder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const PLANNER: &str = "planner";
pub const WEATHER_TOOL: &str = "weather_tool";
pub const ADJUSTER: &str = "adjuster";
pub const HUMAN_REVIEW: &str = "human_review";

/// Precipitation above this (mm) puts the day in the rainy family
pub const RAIN_THRESHOLD_MM: f64 = 1.0;
pub const COLD_BELOW_C: f64 = 15.0;
pub const WARM_ABOVE_C: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeatherCategory {
    RainyAndCold,
    Rainy,
    SunnyAndWarm,
    Sunny,
    Unknown,
}

impl WeatherCategory {
    /// Two thresholds: precipitation picks the family, max temperature the variant.
    /// Rainy days only have a cold variant and sunny days only a warm one.
    pub fn classify(report: Option<&WeatherReport>) -> Self {
        let Some(report) = report else {
            return WeatherCategory::Unknown;
        };

        if report.precipitation_mm > RAIN_THRESHOLD_MM {
            if report.max_temp_c < COLD_BELOW_C {
                WeatherCategory::RainyAndCold
            } else {
                WeatherCategory::Rainy
            }
        } else if report.max_temp_c > WARM_ABOVE_C {
            WeatherCategory::SunnyAndWarm
        } else {
            WeatherCategory::Sunny
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeatherCategory::RainyAndCold => "rainy and cold",
            WeatherCategory::Rainy => "rainy",
            WeatherCategory::SunnyAndWarm => "sunny and warm",
            WeatherCategory::Sunny => "sunny",
            WeatherCategory::Unknown => "unknown",
        }
    }
}

fn required<'a>(step: &str, field: &'static str, value: &'a str) -> Result<&'a str, WorkflowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(WorkflowError::precondition(step, field))
    } else {
        Ok(trimmed)
    }
}

fn planner_prompt(location: &str) -> String {
    format!(
        "You are a helpful travel assistant. Create a concise one-day itinerary for a trip to {}. \
         List morning, afternoon and evening activities with one line each.",
        location
    )
}

fn adjuster_prompt(location: &str, itinerary: &str, weather: &str, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "You are revising a one-day itinerary for {}.\n\n\
         Current itinerary:\n{}\n\n\
         Weather forecast: {}. Swap outdoor plans for indoor alternatives if the weather calls for it.\n",
        location, itinerary, weather
    );
    if let Some(feedback) = feedback {
        prompt.push_str(&format!("\nThe traveller asked for these changes:\n{}\n", feedback));
    }
    prompt.push_str("\nReturn the full revised itinerary.");
    prompt
}

/// Planner node - drafts the first itinerary
pub struct PlannerNode {
    llm: Arc<dyn TextCompletion>,
}

impl PlannerNode {
    pub fn new(llm: Arc<dyn TextCompletion>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl NodeFunction<TravelState> for PlannerNode {
    async fn execute(&self, state: &TravelState) -> Result<TravelUpdate, WorkflowError> {
        let location = required(PLANNER, "location", &state.location)?;
        tracing::info!("🗺️ Drafting itinerary for {}", location);

        let itinerary = self
            .llm
            .complete(&planner_prompt(location))
            .await
            .map_err(|e| WorkflowError::external(PLANNER, e))?;

        Ok(TravelUpdate {
            itinerary: Some(itinerary.clone()),
            revision_count: Some(state.revision_count),
            ..TravelUpdate::default()
        }
        .with_message(StateMessage::assistant(itinerary)))
    }
}

/// Weather node - looks up the forecast and stores its category
pub struct WeatherToolNode {
    weather: Arc<dyn WeatherLookup>,
}

impl WeatherToolNode {
    pub fn new(weather: Arc<dyn WeatherLookup>) -> Self {
        Self { weather }
    }
}

#[async_trait]
impl NodeFunction<TravelState> for WeatherToolNode {
    async fn execute(&self, state: &TravelState) -> Result<TravelUpdate, WorkflowError> {
        let location = required(WEATHER_TOOL, "location", &state.location)?;

        let report = self
            .weather
            .lookup(location)
            .await
            .map_err(|e| WorkflowError::external(WEATHER_TOOL, e))?;
        let category = WeatherCategory::classify(report.as_ref());
        tracing::info!("🌦️ Weather for {}: {}", location, category.as_str());

        Ok(TravelUpdate {
            weather: Some(category.as_str().to_string()),
            ..TravelUpdate::default()
        })
    }
}

/// Adjuster node - rewrites the itinerary for weather and feedback
pub struct AdjusterNode {
    llm: Arc<dyn TextCompletion>,
}

impl AdjusterNode {
    pub fn new(llm: Arc<dyn TextCompletion>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl NodeFunction<TravelState> for AdjusterNode {
    async fn execute(&self, state: &TravelState) -> Result<TravelUpdate, WorkflowError> {
        let itinerary = required(ADJUSTER, "itinerary", &state.itinerary)?;
        let weather = required(ADJUSTER, "weather", &state.weather)?;
        let feedback = state.human_feedback();

        tracing::info!(
            "✏️ Adjusting itinerary (revision {}, feedback: {})",
            state.revision_count + 1,
            feedback.is_some()
        );

        let prompt = adjuster_prompt(&state.location, itinerary, weather, feedback);
        let revised = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|e| WorkflowError::external(ADJUSTER, e))?;

        Ok(TravelUpdate {
            itinerary: Some(revised.clone()),
            human_feedback: Some(String::new()),
            revision_count: Some(state.revision_count + 1),
            ..TravelUpdate::default()
        }
        .with_message(StateMessage::assistant(revised)))
    }
}

/// Review anchor; the pause happens before it and routing reads the merged feedback
pub struct TravelHumanReview;

#[async_trait]
impl NodeFunction<TravelState> for TravelHumanReview {
    async fn execute(&self, _state: &TravelState) -> Result<TravelUpdate, WorkflowError> {
        Ok(TravelUpdate::new())
    }
}

/// Build travel planning workflow graph
pub fn build_travel_graph(
    llm: Arc<dyn TextCompletion>,
    weather: Arc<dyn WeatherLookup>,
) -> Result<StateGraph<TravelState>, WorkflowError> {
    StateGraphBuilder::<TravelState>::new()
        .add_node(
            PLANNER,
            NodeType::Agent,
            Arc::new(PlannerNode::new(llm.clone())),
            "Draft an itinerary for the requested location",
        )
        .add_node(
            WEATHER_TOOL,
            NodeType::Tool,
            Arc::new(WeatherToolNode::new(weather)),
            "Classify today's forecast",
        )
        .add_node(
            ADJUSTER,
            NodeType::Agent,
            Arc::new(AdjusterNode::new(llm)),
            "Rewrite the itinerary for weather and feedback",
        )
        .add_node(
            HUMAN_REVIEW,
            NodeType::Human,
            Arc::new(TravelHumanReview),
            "Traveller approves or requests changes",
        )
        .set_entry_point(PLANNER)
        .add_edge(PLANNER, WEATHER_TOOL)
        .add_conditional_edge(
            WEATHER_TOOL,
            "weather_route",
            weather_route,
            &[
                (WeatherRoute::BadWeather, Target::node(ADJUSTER)),
                (WeatherRoute::GoodWeather, Target::node(HUMAN_REVIEW)),
            ],
        )
        .add_edge(ADJUSTER, HUMAN_REVIEW)
        .add_conditional_edge(
            HUMAN_REVIEW,
            "travel_review_route",
            travel_review_route,
            &[
                (TravelReviewRoute::Approved, Target::End),
                (TravelReviewRoute::Rejected, Target::node(ADJUSTER)),
            ],
        )
        .interrupt_before(HUMAN_REVIEW)
        .build()
}

/// Create travel executor with checkpointing
pub fn create_travel_executor(
    llm: Arc<dyn TextCompletion>,
    weather: Arc<dyn WeatherLookup>,
    store: Arc<dyn CheckpointStore>,
    recorder: Option<Arc<dyn ExecutionRecorder>>,
    config: ExecutorConfig,
) -> Result<WorkflowExecutor<TravelState>, WorkflowError> {
    ExecutorBuilder::new()
        .with_graph(build_travel_graph(llm, weather)?)
        .with_store(store)
        .with_recorder(recorder)
        .with_config(config)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::{FixedWeather, ScriptedCompletion};
    use crate::workflow::checkpoint::InMemoryCheckpointer;

    fn report(precipitation_mm: f64, max_temp_c: f64) -> WeatherReport {
        WeatherReport {
            precipitation_mm,
            max_temp_c,
        }
    }

    #[test]
    fn test_classify_weather_categories() {
        assert_eq!(WeatherCategory::classify(Some(&report(2.0, 10.0))).as_str(), "rainy and cold");
        assert_eq!(WeatherCategory::classify(Some(&report(2.0, 25.0))).as_str(), "rainy");
        assert_eq!(WeatherCategory::classify(Some(&report(0.5, 25.0))).as_str(), "sunny and warm");
        assert_eq!(WeatherCategory::classify(Some(&report(0.5, 10.0))).as_str(), "sunny");
        assert_eq!(WeatherCategory::classify(None).as_str(), "unknown");
    }

    #[test]
    fn test_classify_thresholds_are_strict() {
        assert_eq!(WeatherCategory::classify(Some(&report(1.0, 10.0))), WeatherCategory::Sunny);
        assert_eq!(WeatherCategory::classify(Some(&report(2.0, 15.0))), WeatherCategory::Rainy);
        assert_eq!(WeatherCategory::classify(Some(&report(0.5, 20.0))), WeatherCategory::Sunny);
    }

    #[test]
    fn test_graph_pauses_before_review_only() {
        let graph =
            build_travel_graph(Arc::new(ScriptedCompletion::new()), Arc::new(FixedWeather::default()))
                .unwrap();
        assert_eq!(graph.entry_point(), PLANNER);
        assert!(graph.is_interrupt(HUMAN_REVIEW));
        assert!(!graph.is_interrupt(ADJUSTER));
    }

    #[tokio::test]
    async fn test_planner_requires_location() {
        let node = PlannerNode::new(Arc::new(ScriptedCompletion::new()));
        let err = node.execute(&TravelState::default()).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Precondition { ref step, field: "location" } if step == PLANNER
        ));
    }

    #[tokio::test]
    async fn test_adjuster_prompt_carries_feedback_and_clears_it() {
        let llm = Arc::new(ScriptedCompletion::new());
        llm.push_ok("revised plan");
        let node = AdjusterNode::new(llm.clone());
        let state = TravelState {
            location: "London".to_string(),
            weather: "rainy and cold".to_string(),
            itinerary: "walk along the Thames".to_string(),
            human_feedback: "add a museum".to_string(),
            revision_count: 2,
            ..TravelState::default()
        };

        let update = node.execute(&state).await.unwrap();
        assert_eq!(update.itinerary.as_deref(), Some("revised plan"));
        assert_eq!(update.human_feedback.as_deref(), Some(""));
        assert_eq!(update.revision_count, Some(3));

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("walk along the Thames"));
        assert!(prompt.contains("rainy and cold"));
        assert!(prompt.contains("add a museum"));
    }

    #[tokio::test]
    async fn test_adjuster_requires_weather() {
        let node = AdjusterNode::new(Arc::new(ScriptedCompletion::new()));
        let state = TravelState {
            itinerary: "plan".to_string(),
            ..TravelState::default()
        };
        assert!(matches!(
            node.execute(&state).await,
            Err(WorkflowError::Precondition { field: "weather", .. })
        ));
    }

    fn executor(weather: FixedWeather) -> WorkflowExecutor<TravelState> {
        create_travel_executor(
            Arc::new(ScriptedCompletion::new()),
            Arc::new(weather),
            Arc::new(InMemoryCheckpointer::new()),
            None,
            ExecutorConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_good_weather_skips_adjuster_and_approves() {
        let executor = executor(FixedWeather::default().with("Madrid", 0.0, 26.0));

        let first = executor
            .start("t1", TravelState::input_update("Madrid".to_string()))
            .await
            .unwrap();
        assert_eq!(first.executed, vec![PLANNER, WEATHER_TOOL]);
        assert_eq!(first.snapshot.pending_step(), Some(HUMAN_REVIEW));
        assert_eq!(first.snapshot.state.weather, "sunny and warm");

        let done = executor
            .resume("t1", TravelState::feedback_update("APPROVE".to_string()))
            .await
            .unwrap();
        assert!(done.snapshot.is_completed());
        assert_eq!(done.executed, vec![HUMAN_REVIEW]);
        assert_eq!(done.snapshot.state.revision_count, 0);
    }

    #[tokio::test]
    async fn test_rainy_city_is_adjusted_before_review() {
        let executor = executor(FixedWeather::default().with("London", 4.2, 11.0));

        let report = executor
            .start("t1", TravelState::input_update("London".to_string()))
            .await
            .unwrap();
        assert_eq!(report.executed, vec![PLANNER, WEATHER_TOOL, ADJUSTER]);
        assert!(report.snapshot.is_paused());
        assert_eq!(report.snapshot.state.revision_count, 1);
        assert_eq!(report.snapshot.state.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_each_rejection_adds_one_revision() {
        let executor = executor(FixedWeather::default().with("Madrid", 0.0, 18.0));
        executor
            .start("t1", TravelState::input_update("Madrid".to_string()))
            .await
            .unwrap();

        for (i, feedback) in ["more tapas", "less walking", "approve"].iter().enumerate() {
            let report = executor
                .resume("t1", TravelState::feedback_update(feedback.to_string()))
                .await
                .unwrap();
            assert!(report.snapshot.is_paused());
            assert_eq!(report.executed, vec![HUMAN_REVIEW, ADJUSTER]);
            assert_eq!(report.snapshot.state.revision_count, i as u32 + 1);
            assert_eq!(report.snapshot.state.human_feedback, "");
        }

        let done = executor
            .resume("t1", TravelState::feedback_update("APPROVE".to_string()))
            .await
            .unwrap();
        assert!(done.snapshot.is_completed());
        assert_eq!(done.snapshot.state.revision_count, 3);
    }

    #[tokio::test]
    async fn test_unknown_city_routes_as_good_weather() {
        let executor = executor(FixedWeather::default());

        let report = executor
            .start("t1", TravelState::input_update("Atlantis".to_string()))
            .await
            .unwrap();
        assert_eq!(report.snapshot.state.weather, "unknown");
        assert_eq!(report.executed, vec![PLANNER, WEATHER_TOOL]);
    }

    #[tokio::test]
    async fn test_weather_outage_strands_before_review() {
        let executor = executor(FixedWeather::failing());

        let err = executor
            .start("t1", TravelState::input_update("Madrid".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ExternalCall { ref step, .. } if step == WEATHER_TOOL));

        let snapshot = executor.inspect("t1").await.unwrap();
        assert_eq!(snapshot.pending_step(), Some(WEATHER_TOOL));
        assert_eq!(snapshot.state.weather, "");
        assert_eq!(snapshot.state.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_location_fails_planner_precondition() {
        let executor = executor(FixedWeather::default());

        let err = executor
            .start("t1", TravelState::input_update("   ".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Precondition { field: "location", .. }));
    }
}
