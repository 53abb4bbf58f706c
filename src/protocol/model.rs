// Protocol data model
use serde::{Deserialize, Serialize};

/// One timed step of a protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub title: String,
    pub content: String,
    /// Seconds
    pub duration: u32,
}

/// A spoken cue scheduled at an elapsed second
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioGuide {
    pub time: u32,
    pub text: String,
}

/// A named, timed sequence of regulation steps with spoken cues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub id: String,
    pub title: String,
    pub icon: String,
    pub description: String,
    pub full_title: String,
    /// Total seconds
    pub duration: u32,
    pub explanation: String,
    pub has_breathing: bool,
    pub steps: Vec<Step>,
    pub audio_guide: Vec<AudioGuide>,
}

impl Protocol {
    pub fn step_durations(&self) -> impl Iterator<Item = u32> + '_ {
        self.steps.iter().map(|s| s.duration)
    }

    /// Cue scheduled at exactly `elapsed` seconds
    pub fn cue_at(&self, elapsed: u32) -> Option<&AudioGuide> {
        self.audio_guide.iter().find(|g| g.time == elapsed)
    }

    /// Steps must fill the duration exactly and every cue must land inside it
    pub fn validate(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err(format!("Protocol '{}' has no steps", self.id));
        }
        let total: u32 = self.step_durations().sum();
        if total != self.duration {
            return Err(format!(
                "Protocol '{}' steps sum to {}s but duration is {}s",
                self.id, total, self.duration
            ));
        }
        if let Some(cue) = self.audio_guide.iter().find(|g| g.time > self.duration) {
            return Err(format!(
                "Protocol '{}' has a cue at {}s past its {}s duration",
                self.id, cue.time, self.duration
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol(steps: &[u32], duration: u32, cues: &[u32]) -> Protocol {
        Protocol {
            id: "test".to_string(),
            title: "Test".to_string(),
            icon: String::new(),
            description: String::new(),
            full_title: String::new(),
            duration,
            explanation: String::new(),
            has_breathing: false,
            steps: steps
                .iter()
                .map(|&d| Step {
                    title: format!("{}s", d),
                    content: String::new(),
                    duration: d,
                })
                .collect(),
            audio_guide: cues
                .iter()
                .map(|&t| AudioGuide {
                    time: t,
                    text: format!("cue {}", t),
                })
                .collect(),
        }
    }

    #[test]
    fn test_validate() {
        assert!(protocol(&[20, 30, 40], 90, &[0, 89]).validate().is_ok());
        assert!(protocol(&[20, 30], 90, &[]).validate().is_err());
        assert!(protocol(&[90], 90, &[91]).validate().is_err());
        assert!(protocol(&[], 0, &[]).validate().is_err());
    }

    #[test]
    fn test_cue_at() {
        let p = protocol(&[90], 90, &[0, 10]);
        assert_eq!(p.cue_at(10).map(|c| c.text.as_str()), Some("cue 10"));
        assert!(p.cue_at(11).is_none());
    }

    #[test]
    fn test_json_uses_camel_case() {
        let json = serde_json::to_value(protocol(&[90], 90, &[])).unwrap();
        assert!(json.get("fullTitle").is_some());
        assert!(json.get("hasBreathing").is_some());
        assert!(json.get("audioGuide").is_some());
    }
}
