use std::fmt;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Converting,
    Compressing,
    Preprocessing,
    OcrExtracting,
    QualityGate,
    AiExtracting,
    Validating,
    Persisting,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Converting,
        Stage::Compressing,
        Stage::Preprocessing,
        Stage::OcrExtracting,
        Stage::QualityGate,
        Stage::AiExtracting,
        Stage::Validating,
        Stage::Persisting,
    ];

    /// Identifier used in `errorDetails.step` and the audit trail.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Converting => "Converting",
            Stage::Compressing => "Compressing",
            Stage::Preprocessing => "Preprocessing",
            Stage::OcrExtracting => "OCRExtracting",
            Stage::QualityGate => "QualityGate",
            Stage::AiExtracting => "AIExtracting",
            Stage::Validating => "Validating",
            Stage::Persisting => "Persisting",
        }
    }

    /// Human-readable step shown to clients.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Converting => "Converting to standard format",
            Stage::Compressing => "Compressing image",
            Stage::Preprocessing => "Preprocessing image",
            Stage::OcrExtracting => "Extracting text (OCR)",
            Stage::QualityGate => "Quality gate decision",
            Stage::AiExtracting => "AI extraction",
            Stage::Validating => "Validating results",
            Stage::Persisting => "Saving results",
        }
    }

    /// Progress reported when the stage starts.
    pub fn percentage(&self) -> u8 {
        match self {
            Stage::Converting => 5,
            Stage::Compressing => 15,
            Stage::Preprocessing => 25,
            Stage::OcrExtracting => 45,
            Stage::QualityGate => 55,
            Stage::AiExtracting => 60,
            Stage::Validating => 90,
            Stage::Persisting => 95,
        }
    }

    /// AI extraction progress of `inner` percent mapped into 60..=90.
    pub fn ai_percentage(inner: u8) -> u8 {
        let inner = u16::from(inner.min(100));
        let span = u16::from(Stage::Validating.percentage() - Stage::AiExtracting.percentage());
        Stage::AiExtracting.percentage() + (inner * span / 100) as u8
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentages_follow_stage_order() {
        let pcts: Vec<u8> = Stage::ALL.iter().map(Stage::percentage).collect();
        assert!(pcts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Stage::Persisting.percentage(), 95);
    }

    #[test]
    fn test_ai_percentage_range() {
        assert_eq!(Stage::ai_percentage(0), 60);
        assert_eq!(Stage::ai_percentage(50), 75);
        assert_eq!(Stage::ai_percentage(100), 90);
        assert_eq!(Stage::ai_percentage(200), 90);
    }

    #[test]
    fn test_step_identifiers() {
        assert_eq!(Stage::AiExtracting.as_str(), "AIExtracting");
        assert_eq!(Stage::OcrExtracting.to_string(), "OCRExtracting");
    }
}
