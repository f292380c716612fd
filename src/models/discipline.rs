// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity disciplines and the provider vocabulary that maps onto them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Internal discipline code stored on every activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    Run,
    TrailRun,
    VirtualRun,
    Walk,
    Hike,
    Ride,
    MountainBikeRide,
    GravelRide,
    EBikeRide,
    VirtualRide,
    Swim,
    Rowing,
    NordicSki,
    AlpineSki,
    Snowboard,
    WeightTraining,
    Yoga,
    Workout,
    Elliptical,
    StairStepper,
    Other,
}

impl Discipline {
    const ALL: [Discipline; 21] = [
        Discipline::Run,
        Discipline::TrailRun,
        Discipline::VirtualRun,
        Discipline::Walk,
        Discipline::Hike,
        Discipline::Ride,
        Discipline::MountainBikeRide,
        Discipline::GravelRide,
        Discipline::EBikeRide,
        Discipline::VirtualRide,
        Discipline::Swim,
        Discipline::Rowing,
        Discipline::NordicSki,
        Discipline::AlpineSki,
        Discipline::Snowboard,
        Discipline::WeightTraining,
        Discipline::Yoga,
        Discipline::Workout,
        Discipline::Elliptical,
        Discipline::StairStepper,
        Discipline::Other,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Discipline::Run => "run",
            Discipline::TrailRun => "trail_run",
            Discipline::VirtualRun => "virtual_run",
            Discipline::Walk => "walk",
            Discipline::Hike => "hike",
            Discipline::Ride => "ride",
            Discipline::MountainBikeRide => "mountain_bike_ride",
            Discipline::GravelRide => "gravel_ride",
            Discipline::EBikeRide => "e_bike_ride",
            Discipline::VirtualRide => "virtual_ride",
            Discipline::Swim => "swim",
            Discipline::Rowing => "rowing",
            Discipline::NordicSki => "nordic_ski",
            Discipline::AlpineSki => "alpine_ski",
            Discipline::Snowboard => "snowboard",
            Discipline::WeightTraining => "weight_training",
            Discipline::Yoga => "yoga",
            Discipline::Workout => "workout",
            Discipline::Elliptical => "elliptical",
            Discipline::StairStepper => "stair_stepper",
            Discipline::Other => "other",
        }
    }

    /// Parse an internal code (as produced by [`Discipline::code`]).
    pub fn from_code_name(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.code() == code)
    }
}

/// Provider type strings, Strava `sport_type`/`type` and Garmin
/// `activityType`, mapped to disciplines.
static PROVIDER_VOCABULARY: &[(&str, Discipline)] = &[
    // Strava
    ("Run", Discipline::Run),
    ("TrailRun", Discipline::TrailRun),
    ("VirtualRun", Discipline::VirtualRun),
    ("Walk", Discipline::Walk),
    ("Hike", Discipline::Hike),
    ("Ride", Discipline::Ride),
    ("MountainBikeRide", Discipline::MountainBikeRide),
    ("GravelRide", Discipline::GravelRide),
    ("EBikeRide", Discipline::EBikeRide),
    ("EMountainBikeRide", Discipline::EBikeRide),
    ("VirtualRide", Discipline::VirtualRide),
    ("Velomobile", Discipline::Ride),
    ("Handcycle", Discipline::Ride),
    ("Swim", Discipline::Swim),
    ("Rowing", Discipline::Rowing),
    ("VirtualRow", Discipline::Rowing),
    ("NordicSki", Discipline::NordicSki),
    ("BackcountrySki", Discipline::NordicSki),
    ("RollerSki", Discipline::NordicSki),
    ("AlpineSki", Discipline::AlpineSki),
    ("Snowboard", Discipline::Snowboard),
    ("WeightTraining", Discipline::WeightTraining),
    ("Crossfit", Discipline::Workout),
    ("HighIntensityIntervalTraining", Discipline::Workout),
    ("Yoga", Discipline::Yoga),
    ("Pilates", Discipline::Yoga),
    ("Workout", Discipline::Workout),
    ("Elliptical", Discipline::Elliptical),
    ("StairStepper", Discipline::StairStepper),
    // Garmin
    ("RUNNING", Discipline::Run),
    ("STREET_RUNNING", Discipline::Run),
    ("TRACK_RUNNING", Discipline::Run),
    ("TRAIL_RUNNING", Discipline::TrailRun),
    ("TREADMILL_RUNNING", Discipline::VirtualRun),
    ("INDOOR_RUNNING", Discipline::VirtualRun),
    ("WALKING", Discipline::Walk),
    ("CASUAL_WALKING", Discipline::Walk),
    ("SPEED_WALKING", Discipline::Walk),
    ("HIKING", Discipline::Hike),
    ("CYCLING", Discipline::Ride),
    ("ROAD_BIKING", Discipline::Ride),
    ("MOUNTAIN_BIKING", Discipline::MountainBikeRide),
    ("GRAVEL_CYCLING", Discipline::GravelRide),
    ("E_BIKE_FITNESS", Discipline::EBikeRide),
    ("E_BIKE_MOUNTAIN", Discipline::EBikeRide),
    ("INDOOR_CYCLING", Discipline::VirtualRide),
    ("VIRTUAL_RIDE", Discipline::VirtualRide),
    ("LAP_SWIMMING", Discipline::Swim),
    ("OPEN_WATER_SWIMMING", Discipline::Swim),
    ("SWIMMING", Discipline::Swim),
    ("INDOOR_ROWING", Discipline::Rowing),
    ("CROSS_COUNTRY_SKIING_WS", Discipline::NordicSki),
    ("SKATE_SKIING_WS", Discipline::NordicSki),
    ("BACKCOUNTRY_SKIING", Discipline::NordicSki),
    ("RESORT_SKIING_SNOWBOARDING_WS", Discipline::AlpineSki),
    ("SNOWBOARDING", Discipline::Snowboard),
    ("STRENGTH_TRAINING", Discipline::WeightTraining),
    ("YOGA", Discipline::Yoga),
    ("PILATES", Discipline::Yoga),
    ("HIIT", Discipline::Workout),
    ("CARDIO_TRAINING", Discipline::Workout),
    ("FITNESS_EQUIPMENT", Discipline::Workout),
    ("ELLIPTICAL", Discipline::Elliptical),
    ("STAIR_CLIMBING", Discipline::StairStepper),
];

/// Strip case and separators so `TrailRun`, `trail_run` and `TRAIL RUN`
/// compare equal.
fn fold(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolves provider type strings to disciplines.
///
/// Resolution order for a payload: fine-grained type exact, coarse type
/// exact, fine-grained folded, coarse folded, configured default, then
/// [`Discipline::Other`].
#[derive(Debug, Clone)]
pub struct DisciplineLookup {
    exact: HashMap<&'static str, Discipline>,
    folded: HashMap<String, Discipline>,
    default: Option<Discipline>,
}

impl DisciplineLookup {
    pub fn new(default: Option<Discipline>) -> Self {
        let mut exact = HashMap::with_capacity(PROVIDER_VOCABULARY.len());
        let mut folded = HashMap::with_capacity(PROVIDER_VOCABULARY.len());
        for (name, discipline) in PROVIDER_VOCABULARY {
            exact.insert(*name, *discipline);
            folded.entry(fold(name)).or_insert(*discipline);
        }
        // Internal codes resolve to themselves (e.g. manual entries).
        for discipline in Discipline::ALL {
            folded.entry(fold(discipline.code())).or_insert(discipline);
        }
        Self {
            exact,
            folded,
            default,
        }
    }

    /// Resolve a discipline from the fine and coarse type fields.
    ///
    /// The second element is false when neither field matched and the
    /// configured default or the fallback was used.
    pub fn resolve(&self, fine: Option<&str>, coarse: Option<&str>) -> (Discipline, bool) {
        let fine = fine.map(str::trim).filter(|s| !s.is_empty());
        let coarse = coarse.map(str::trim).filter(|s| !s.is_empty());

        let found = fine
            .and_then(|t| self.exact.get(t))
            .or_else(|| coarse.and_then(|t| self.exact.get(t)))
            .or_else(|| fine.and_then(|t| self.folded.get(&fold(t))))
            .or_else(|| coarse.and_then(|t| self.folded.get(&fold(t))));

        match found {
            Some(d) => (*d, true),
            None => (self.default.unwrap_or(Discipline::Other), false),
        }
    }
}

impl Default for DisciplineLookup {
    fn default() -> Self {
        Self::new(None)
    }
}
