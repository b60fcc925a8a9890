// Router - Pure routing predicates evaluated at branch points
use super::graph::RouteOutcome;
use super::state::{CoachState, TravelState, WorkflowState};

/// Exact token the travel front end sends to accept an itinerary
pub const TRAVEL_APPROVAL: &str = "APPROVE";

/// Case-insensitive substring that marks coaching feedback as an approval
pub const COACH_APPROVAL_TOKEN: &str = "approve";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherRoute {
    BadWeather,
    GoodWeather,
}

impl RouteOutcome for WeatherRoute {
    const ALL: &'static [Self] = &[WeatherRoute::BadWeather, WeatherRoute::GoodWeather];

    fn label(self) -> &'static str {
        match self {
            WeatherRoute::BadWeather => "bad_weather",
            WeatherRoute::GoodWeather => "good_weather",
        }
    }
}

/// Rainy-family categories need the itinerary adjusted before review
pub fn weather_route(state: &TravelState) -> WeatherRoute {
    if state.weather.to_lowercase().contains("rainy") {
        WeatherRoute::BadWeather
    } else {
        WeatherRoute::GoodWeather
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelReviewRoute {
    Approved,
    Rejected,
}

impl RouteOutcome for TravelReviewRoute {
    const ALL: &'static [Self] = &[TravelReviewRoute::Approved, TravelReviewRoute::Rejected];

    fn label(self) -> &'static str {
        match self {
            TravelReviewRoute::Approved => "approved",
            TravelReviewRoute::Rejected => "rejected",
        }
    }
}

pub fn travel_review_route(state: &TravelState) -> TravelReviewRoute {
    if state.human_feedback == TRAVEL_APPROVAL {
        TravelReviewRoute::Approved
    } else {
        TravelReviewRoute::Rejected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoachReviewRoute {
    Approved,
    Refine,
    AwaitFeedback,
}

impl RouteOutcome for CoachReviewRoute {
    const ALL: &'static [Self] = &[
        CoachReviewRoute::Approved,
        CoachReviewRoute::Refine,
        CoachReviewRoute::AwaitFeedback,
    ];

    fn label(self) -> &'static str {
        match self {
            CoachReviewRoute::Approved => "approved",
            CoachReviewRoute::Refine => "refine",
            CoachReviewRoute::AwaitFeedback => "await_feedback",
        }
    }
}

pub fn is_coach_approval(feedback: &str) -> bool {
    feedback.to_lowercase().contains(COACH_APPROVAL_TOKEN)
}

pub fn coach_review_route(state: &CoachState) -> CoachReviewRoute {
    if state.is_approved {
        CoachReviewRoute::Approved
    } else if state.human_feedback().is_some() {
        CoachReviewRoute::Refine
    } else {
        CoachReviewRoute::AwaitFeedback
    }
}
