// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Traffic analysis - congestion per grid cell and usage heat maps

mod congestion;
mod heatmap;

pub use congestion::*;
pub use heatmap::*;

use serde::{Deserialize, Serialize};

/// Congestion classification of a cell or a whole path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
}

impl CongestionLevel {
    pub fn color(&self) -> &'static str {
        match self {
            CongestionLevel::Low => "#00FF00",
            CongestionLevel::Medium => "#FFA500",
            CongestionLevel::High => "#FF0000",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CongestionLevel::Low => "Light traffic - smooth flow",
            CongestionLevel::Medium => "Moderate traffic - some delays",
            CongestionLevel::High => "Heavy traffic - significant delays",
        }
    }
}
