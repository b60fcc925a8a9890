// Career coaching workflow - profile, gap analysis, learning plan and review loop
use super::checkpoint::CheckpointStore;
use super::error::WorkflowError;
use super::executor::{ExecutorBuilder, ExecutorConfig, WorkflowExecutor};
use super::graph::{NodeFunction, NodeType, StateGraph, StateGraphBuilder, Target};
use super::router::{coach_review_route, is_coach_approval, CoachReviewRoute};
use super::state::{CoachState, CoachUpdate, StateMessage, UserProfile, WorkflowState};
use crate::capabilities::TextCompletion;
use crate::services::execution_log::ExecutionRecorder;
use async_trait::async_trait;
use std::sync::Arc;

pub const PROFILE_ANALYZER: &str = "profile_analyzer";
pub const GAP_ANALYZER: &str = "gap_analyzer";
pub const PLAN_GENERATOR: &str = "plan_generator";
pub const HUMAN_REVIEW: &str = "human_review";
pub const PLAN_REFINER: &str = "plan_refiner";

fn non_blank<'a>(step: &str, field: &'static str, value: Option<&'a str>) -> Result<&'a str, WorkflowError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(WorkflowError::precondition(step, field)),
    }
}

/// Run one completion, tagging failures with the calling step
async fn complete(llm: &dyn TextCompletion, step: &str, prompt: String) -> Result<String, WorkflowError> {
    llm.complete(&prompt)
        .await
        .map_err(|e| WorkflowError::external(step, e))
}

/// Profile analyzer - extracts goals and current skills from the latest user message
pub struct ProfileAnalyzerNode {
    llm: Arc<dyn TextCompletion>,
}

#[async_trait]
impl NodeFunction<CoachState> for ProfileAnalyzerNode {
    async fn execute(&self, state: &CoachState) -> Result<CoachUpdate, WorkflowError> {
        let input = non_blank(
            PROFILE_ANALYZER,
            "messages",
            state.last_user_message().map(|m| m.content.as_str()),
        )?;
        tracing::info!("🧭 Extracting user profile...");

        let prompt = format!(
            "You are an expert career counselor. Analyze the following user input and extract:\n\
             1. Career goals\n\
             2. Current skills\n\n\
             User input: \"{}\"\n\n\
             Summarize both clearly.",
            input
        );
        let summary = complete(self.llm.as_ref(), PROFILE_ANALYZER, prompt).await?;

        Ok(CoachUpdate {
            user_profile: Some(UserProfile {
                raw_summary: summary.clone(),
            }),
            ..CoachUpdate::default()
        }
        .with_message(StateMessage::assistant(summary)))
    }
}

/// Gap analyzer - compares the profile against the stated goals
pub struct GapAnalyzerNode {
    llm: Arc<dyn TextCompletion>,
}

#[async_trait]
impl NodeFunction<CoachState> for GapAnalyzerNode {
    async fn execute(&self, state: &CoachState) -> Result<CoachUpdate, WorkflowError> {
        let profile = non_blank(
            GAP_ANALYZER,
            "user_profile",
            state.user_profile.as_ref().map(|p| p.raw_summary.as_str()),
        )?;
        tracing::info!("🔍 Analyzing skill gaps...");

        let prompt = format!(
            "Based on the following user profile, perform a gap analysis:\n\n{}\n\n\
             Identify missing skills, knowledge areas, or experiences required to achieve the career goals.",
            profile
        );
        let gaps = complete(self.llm.as_ref(), GAP_ANALYZER, prompt).await?;

        Ok(CoachUpdate {
            gap_analysis: Some(gaps.clone()),
            ..CoachUpdate::default()
        }
        .with_message(StateMessage::assistant(gaps)))
    }
}

pub struct PlanGeneratorNode {
    llm: Arc<dyn TextCompletion>,
}

#[async_trait]
impl NodeFunction<CoachState> for PlanGeneratorNode {
    async fn execute(&self, state: &CoachState) -> Result<CoachUpdate, WorkflowError> {
        let gaps = non_blank(PLAN_GENERATOR, "gap_analysis", Some(state.gap_analysis.as_str()))?;
        tracing::info!("📚 Creating learning plan...");

        let prompt = format!(
            "Create a comprehensive learning plan to bridge the following gaps:\n\n{}\n\n\
             Include:\n\
             1. Recommended courses or resources.\n\
             2. Project ideas.\n\
             3. Timeline estimates.",
            gaps
        );
        let plan = complete(self.llm.as_ref(), PLAN_GENERATOR, prompt).await?;

        Ok(CoachUpdate {
            learning_plan: Some(plan.clone()),
            revision_count: Some(state.revision_count),
            ..CoachUpdate::default()
        }
        .with_message(StateMessage::assistant(plan)))
    }
}

/// Review step - turns merged feedback into an approval decision
pub struct CoachHumanReview;

#[async_trait]
impl NodeFunction<CoachState> for CoachHumanReview {
    async fn execute(&self, state: &CoachState) -> Result<CoachUpdate, WorkflowError> {
        let approved = state.human_feedback().map(is_coach_approval).unwrap_or(false);
        tracing::info!("👤 Review processed (approved: {})", approved);

        // An approval is consumed here; rejections are consumed by the refiner
        Ok(CoachUpdate {
            is_approved: Some(approved),
            human_feedback: approved.then(String::new),
            ..CoachUpdate::default()
        })
    }
}

/// Plan refiner - applies review feedback and consumes it
pub struct PlanRefinerNode {
    llm: Arc<dyn TextCompletion>,
}

#[async_trait]
impl NodeFunction<CoachState> for PlanRefinerNode {
    async fn execute(&self, state: &CoachState) -> Result<CoachUpdate, WorkflowError> {
        let plan = non_blank(PLAN_REFINER, "learning_plan", Some(state.learning_plan.as_str()))?;
        let feedback = non_blank(PLAN_REFINER, "human_feedback", state.human_feedback())?;
        tracing::info!("🛠️ Refining plan (revision {})", state.revision_count + 1);

        let prompt = format!(
            "The user has provided feedback on the learning plan.\n\n\
             Current plan:\n{}\n\n\
             User feedback:\n{}\n\n\
             Please update the plan to address the feedback.",
            plan, feedback
        );
        let revised = complete(self.llm.as_ref(), PLAN_REFINER, prompt).await?;

        Ok(CoachUpdate {
            learning_plan: Some(revised.clone()),
            human_feedback: Some(String::new()),
            revision_count: Some(state.revision_count + 1),
            ..CoachUpdate::default()
        }
        .with_message(StateMessage::assistant(revised)))
    }
}

/// Build career coaching workflow graph
pub fn build_coach_graph(llm: Arc<dyn TextCompletion>) -> Result<StateGraph<CoachState>, WorkflowError> {
    StateGraphBuilder::<CoachState>::new()
        .add_node(
            PROFILE_ANALYZER,
            NodeType::Agent,
            Arc::new(ProfileAnalyzerNode { llm: llm.clone() }),
            "Extract career goals and current skills",
        )
        .add_node(
            GAP_ANALYZER,
            NodeType::Agent,
            Arc::new(GapAnalyzerNode { llm: llm.clone() }),
            "Identify missing skills",
        )
        .add_node(
            PLAN_GENERATOR,
            NodeType::Agent,
            Arc::new(PlanGeneratorNode { llm: llm.clone() }),
            "Draft a learning plan",
        )
        .add_node(
            HUMAN_REVIEW,
            NodeType::Human,
            Arc::new(CoachHumanReview),
            "User approves or requests changes",
        )
        .add_node(
            PLAN_REFINER,
            NodeType::Agent,
            Arc::new(PlanRefinerNode { llm }),
            "Revise the plan from feedback",
        )
        .set_entry_point(PROFILE_ANALYZER)
        .add_edge(PROFILE_ANALYZER, GAP_ANALYZER)
        .add_edge(GAP_ANALYZER, PLAN_GENERATOR)
        .add_edge(PLAN_GENERATOR, HUMAN_REVIEW)
        .add_conditional_edge(
            HUMAN_REVIEW,
            "coach_review_route",
            coach_review_route,
            &[
                (CoachReviewRoute::Approved, Target::End),
                (CoachReviewRoute::Refine, Target::node(PLAN_REFINER)),
                (CoachReviewRoute::AwaitFeedback, Target::AwaitInput),
            ],
        )
        .add_edge(PLAN_REFINER, HUMAN_REVIEW)
        .interrupt_before(HUMAN_REVIEW)
        .build()
}

/// Create coaching executor with checkpointing
pub fn create_coach_executor(
    llm: Arc<dyn TextCompletion>,
    store: Arc<dyn CheckpointStore>,
    recorder: Option<Arc<dyn ExecutionRecorder>>,
    config: ExecutorConfig,
) -> Result<WorkflowExecutor<CoachState>, WorkflowError> {
    ExecutorBuilder::new()
        .with_graph(build_coach_graph(llm)?)
        .with_store(store)
        .with_recorder(recorder)
        .with_config(config)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::ScriptedCompletion;
    use crate::db;
    use crate::services::execution_log::ExecutionLogger;
    use crate::workflow::checkpoint::{InMemoryCheckpointer, SqliteCheckpointer};
    use crate::workflow::executor::SessionStatus;

    const GOAL: &str = "I want to be a data scientist. I know Python and SQL.";

    fn executor(llm: Arc<ScriptedCompletion>) -> WorkflowExecutor<CoachState> {
        create_coach_executor(
            llm,
            Arc::new(InMemoryCheckpointer::new()),
            None,
            ExecutorConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_pass_pauses_before_review() {
        let llm = Arc::new(ScriptedCompletion::new());
        llm.push_ok("profile").push_ok("gaps").push_ok("plan v1");
        let executor = executor(llm.clone());

        let report = executor
            .start("c1", CoachState::input_update(GOAL.to_string()))
            .await
            .unwrap();

        assert_eq!(report.executed, vec![PROFILE_ANALYZER, GAP_ANALYZER, PLAN_GENERATOR]);
        assert!(report.snapshot.is_paused());
        assert_eq!(report.snapshot.pending_step(), Some(HUMAN_REVIEW));

        let state = &report.snapshot.state;
        assert_eq!(state.user_profile.as_ref().unwrap().raw_summary, "profile");
        assert_eq!(state.gap_analysis, "gaps");
        assert_eq!(state.learning_plan, "plan v1");
        assert_eq!(state.revision_count, 0);
        assert_eq!(state.messages.len(), 4);
        assert!(llm.prompts()[0].contains(GOAL));
        assert!(llm.prompts()[1].contains("profile"));
        assert!(llm.prompts()[2].contains("gaps"));
    }

    #[tokio::test]
    async fn test_approval_at_first_pause_keeps_revision() {
        let executor = executor(Arc::new(ScriptedCompletion::new()));
        executor
            .start("c1", CoachState::input_update(GOAL.to_string()))
            .await
            .unwrap();

        let done = executor
            .resume("c1", CoachState::feedback_update("Looks good, I Approve!".to_string()))
            .await
            .unwrap();
        assert!(done.snapshot.is_completed());
        assert!(done.snapshot.state.is_approved);
        assert_eq!(done.snapshot.state.human_feedback, "");
        assert_eq!(done.snapshot.state.revision_count, 0);
        assert_eq!(done.executed, vec![HUMAN_REVIEW]);
    }

    #[tokio::test]
    async fn test_restart_after_approval_pauses_unapproved() {
        let executor = executor(Arc::new(ScriptedCompletion::new()));
        executor
            .start("c1", CoachState::input_update(GOAL.to_string()))
            .await
            .unwrap();
        executor
            .resume("c1", CoachState::feedback_update("approve".to_string()))
            .await
            .unwrap();

        let restarted = executor
            .start("c1", CoachState::input_update("Now I want to move into ML ops".to_string()))
            .await
            .unwrap();
        assert!(restarted.snapshot.is_paused());
        assert!(!restarted.snapshot.state.is_approved);
        assert_eq!(restarted.snapshot.state.human_feedback, "");
        assert_eq!(
            restarted.snapshot.state.last_user_message().map(|m| m.content.as_str()),
            Some("Now I want to move into ML ops")
        );
    }

    #[tokio::test]
    async fn test_n_refinements_then_approval() {
        let llm = Arc::new(ScriptedCompletion::new());
        let executor = executor(llm.clone());
        executor
            .start("c1", CoachState::input_update(GOAL.to_string()))
            .await
            .unwrap();

        for n in 1..=3u32 {
            let feedback = format!("add more statistics, round {}", n);
            let report = executor
                .resume("c1", CoachState::feedback_update(feedback.clone()))
                .await
                .unwrap();
            assert_eq!(report.executed, vec![HUMAN_REVIEW, PLAN_REFINER]);
            assert!(report.snapshot.is_paused());
            assert_eq!(report.snapshot.state.revision_count, n);
            assert_eq!(report.snapshot.state.human_feedback, "");
            assert!(!report.snapshot.state.is_approved);
            assert!(llm.prompts().last().unwrap().contains(&feedback));
        }

        let done = executor
            .resume("c1", CoachState::feedback_update("approve".to_string()))
            .await
            .unwrap();
        assert!(done.snapshot.is_completed());
        assert_eq!(done.snapshot.state.revision_count, 3);
    }

    #[tokio::test]
    async fn test_empty_feedback_keeps_session_paused_at_review() {
        let executor = executor(Arc::new(ScriptedCompletion::new()));
        let first = executor
            .start("c1", CoachState::input_update(GOAL.to_string()))
            .await
            .unwrap();

        let report = executor
            .resume("c1", CoachState::feedback_update("   ".to_string()))
            .await
            .unwrap();
        assert_eq!(report.executed, vec![HUMAN_REVIEW]);
        assert_eq!(report.snapshot.status, SessionStatus::Paused);
        assert_eq!(report.snapshot.pending_step(), Some(HUMAN_REVIEW));
        assert_eq!(report.snapshot.state.learning_plan, first.snapshot.state.learning_plan);
        assert_eq!(report.snapshot.state.revision_count, 0);

        let inspected = executor.inspect("c1").await.unwrap();
        assert!(inspected.is_paused());
    }

    #[tokio::test]
    async fn test_refiner_failure_is_retryable_without_losing_feedback() {
        let llm = Arc::new(ScriptedCompletion::new());
        llm.push_ok("profile").push_ok("gaps").push_ok("plan v1").push_err("quota exceeded");
        let executor = executor(llm);
        executor
            .start("c1", CoachState::input_update(GOAL.to_string()))
            .await
            .unwrap();

        let err = executor
            .resume("c1", CoachState::feedback_update("more projects".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ExternalCall { ref step, .. } if step == PLAN_REFINER));

        let stranded = executor.inspect("c1").await.unwrap();
        assert_eq!(stranded.status, SessionStatus::Stranded);
        assert_eq!(stranded.pending_step(), Some(PLAN_REFINER));
        assert_eq!(stranded.state.human_feedback, "more projects");
        assert_eq!(stranded.state.learning_plan, "plan v1");

        let retried = executor
            .resume("c1", CoachState::feedback_update(String::new()))
            .await
            .unwrap();
        assert_eq!(retried.executed, vec![PLAN_REFINER]);
        assert_eq!(retried.snapshot.state.revision_count, 1);
        assert!(retried.snapshot.is_paused());
    }

    #[tokio::test]
    async fn test_refiner_requires_feedback() {
        let node = PlanRefinerNode {
            llm: Arc::new(ScriptedCompletion::new()),
        };
        let state = CoachState {
            learning_plan: "plan".to_string(),
            ..CoachState::default()
        };
        assert!(matches!(
            node.execute(&state).await,
            Err(WorkflowError::Precondition { field: "human_feedback", .. })
        ));
    }

    #[tokio::test]
    async fn test_profile_analyzer_requires_user_message() {
        let executor = executor(Arc::new(ScriptedCompletion::new()));
        let err = executor.start("c1", CoachUpdate::new()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Precondition { field: "messages", .. }));
    }

    #[tokio::test]
    async fn test_paused_session_survives_restart_on_sqlite() {
        let pool = db::connect_in_memory().await.unwrap();
        let store = SqliteCheckpointer::new(pool.clone());
        store.setup().await.unwrap();
        let logger = ExecutionLogger::new(pool);
        logger.setup().await.unwrap();
        let store: Arc<dyn CheckpointStore> = Arc::new(store);

        let first = create_coach_executor(
            Arc::new(ScriptedCompletion::new()),
            store.clone(),
            Some(Arc::new(logger.clone()) as Arc<dyn ExecutionRecorder>),
            ExecutorConfig::default(),
        )
        .unwrap();
        first
            .start("c1", CoachState::input_update(GOAL.to_string()))
            .await
            .unwrap();
        drop(first);

        let second = create_coach_executor(
            Arc::new(ScriptedCompletion::new()),
            store,
            Some(Arc::new(logger.clone()) as Arc<dyn ExecutionRecorder>),
            ExecutorConfig::default(),
        )
        .unwrap();
        let snapshot = second.inspect("c1").await.unwrap();
        assert!(snapshot.is_paused());
        assert_eq!(snapshot.state.messages.len(), 4);

        let done = second
            .resume("c1", CoachState::feedback_update("approve".to_string()))
            .await
            .unwrap();
        assert!(done.snapshot.is_completed());

        let names: Vec<String> = logger
            .get_logs_for_session("c1")
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.node_name)
            .collect();
        assert_eq!(names, vec![PROFILE_ANALYZER, GAP_ANALYZER, PLAN_GENERATOR, HUMAN_REVIEW]);
    }
}
