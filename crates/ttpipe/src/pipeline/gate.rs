//! The quality gate: decides whether OCR output is good enough on its own.

use serde::Serialize;

/// Where the pipeline goes after OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateRoute {
    /// Confidence met the threshold; validate the OCR output directly.
    Validation,
    /// Confidence below threshold; run the vision model.
    AiExtraction,
    /// Confidence below threshold but no AI provider is available.
    OcrOnly,
}

impl GateRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateRoute::Validation => "validation",
            GateRoute::AiExtraction => "ai_extraction",
            GateRoute::OcrOnly => "ocr_only",
        }
    }

    pub fn uses_ai(&self) -> bool {
        matches!(self, GateRoute::AiExtraction)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityGateDecision {
    pub route: GateRoute,
    pub confidence: f64,
    pub threshold: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct QualityGate {
    threshold: f64,
}

impl QualityGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Pure routing decision. The threshold is inclusive: a confidence equal
    /// to it takes the direct branch.
    pub fn decide(&self, confidence: f64, ai_available: bool) -> QualityGateDecision {
        let pct = confidence * 100.0;
        let (route, reason) = if confidence >= self.threshold {
            (
                GateRoute::Validation,
                format!("High confidence ({:.2}%) - direct validation", pct),
            )
        } else if ai_available {
            (
                GateRoute::AiExtraction,
                format!("Low confidence ({:.2}%) - AI extraction required", pct),
            )
        } else {
            (
                GateRoute::OcrOnly,
                format!("Low confidence ({:.2}%) - AI provider disabled", pct),
            )
        };

        QualityGateDecision {
            route,
            confidence,
            threshold: self.threshold,
            reason,
        }
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(0.80)
    }
}
