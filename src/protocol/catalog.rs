// Built-in protocols

use crate::error::{AudioError, Result};
use crate::protocol::model::{AudioGuide, Protocol, Step};

fn step(title: &str, content: &str, duration: u32) -> Step {
    Step {
        title: title.to_string(),
        content: content.to_string(),
        duration,
    }
}

fn cue(time: u32, text: &str) -> AudioGuide {
    AudioGuide {
        time,
        text: text.to_string(),
    }
}

pub fn builtin_protocols() -> Vec<Protocol> {
    vec![
        Protocol {
            id: "panic".to_string(),
            title: "Panic / Anxiety".to_string(),
            icon: "🔥".to_string(),
            description: "Heart racing • Overwhelmed • Spiraling".to_string(),
            full_title: "Sympathetic Shutdown Protocol".to_string(),
            duration: 90,
            explanation: "Your nervous system is in fight-or-flight overdrive. This protocol uses \
                physiological sighs and cold stimulation to activate your vagus nerve and force a \
                parasympathetic response."
                .to_string(),
            has_breathing: true,
            steps: vec![
                step(
                    "Physiological Sigh (20s)",
                    "Double inhale through nose, long exhale through mouth. Inhale deeply, then \
                     inhale again to top it off, then slow exhale. Repeat 3 times.",
                    20,
                ),
                step(
                    "Cold Splash (30s)",
                    "If possible, splash cold water on your face or hold ice to your forehead. \
                     This triggers the dive reflex.",
                    30,
                ),
                step(
                    "Bilateral Stimulation (40s)",
                    "Butterfly hug: Cross arms over chest, alternate tapping shoulders. Left, \
                     right, left, right.",
                    40,
                ),
            ],
            audio_guide: vec![
                cue(0, "Find a comfortable position. You're safe here. Let's bring your nervous system back to balance."),
                cue(10, "Take a deep breath in through your nose. And another quick inhale to top it off."),
                cue(20, "Now release slowly through your mouth. Feel your shoulders drop."),
                cue(30, "If you have cold water or ice, gently apply it to your face. Feel the coolness."),
                cue(50, "Now cross your arms over your chest. Tap your left shoulder, then your right. Gentle rhythm."),
                cue(80, "Notice how different you feel. This is you taking your power back."),
            ],
        },
        Protocol {
            id: "freeze".to_string(),
            title: "Numb / Freeze".to_string(),
            icon: "❄️".to_string(),
            description: "Can't focus • Heavy • Disconnected".to_string(),
            full_title: "Activation Protocol".to_string(),
            duration: 90,
            explanation: "Your nervous system is in shutdown. This protocol uses movement and \
                sensory stimulation to bring energy back online."
                .to_string(),
            has_breathing: false,
            steps: vec![
                step(
                    "Shake It Out (30s)",
                    "Stand up. Shake your hands vigorously. Then shake your whole body - arms, \
                     legs, shoulders.",
                    30,
                ),
                step(
                    "Strong Sensation (30s)",
                    "Ice, sour candy, or stomp your feet hard. You need intense sensory input to \
                     override numbness.",
                    30,
                ),
                step(
                    "Name 5 Things (30s)",
                    "Look around: 5 things you see, 4 you can touch, 3 you hear, 2 you smell, 1 \
                     you taste.",
                    30,
                ),
            ],
            audio_guide: vec![
                cue(0, "You're safe. Let's wake your system back up, gently. Stand if you can."),
                cue(10, "Shake your hands. Vigorous, like shaking off water. Feel the movement."),
                cue(35, "Now you need strong sensation. Ice, sour candy, stomp your feet. Do it now."),
                cue(65, "Look around. Name 5 things you see. Out loud if you can."),
                cue(85, "You're back. Welcome back."),
            ],
        },
        Protocol {
            id: "insomnia".to_string(),
            title: "Insomnia".to_string(),
            icon: "🌙".to_string(),
            description: "Mind won't stop • Can't sleep".to_string(),
            full_title: "Sleep Onset Protocol".to_string(),
            duration: 90,
            explanation: "Your nervous system is too activated for sleep. This uses 4-7-8 \
                breathing and progressive relaxation."
                .to_string(),
            has_breathing: true,
            steps: vec![
                step(
                    "4-7-8 Breathing (45s)",
                    "Inhale 4 counts, hold 7, exhale 8. This creates drowsiness. Repeat 3 times.",
                    45,
                ),
                step(
                    "Body Scan (45s)",
                    "Starting at toes, relax each body part. Toes, feet, calves, thighs, stomach, \
                     chest, arms, shoulders, jaw, eyes.",
                    45,
                ),
            ],
            audio_guide: vec![
                cue(0, "Your mind is busy, but your body is ready to rest. Let's signal sleep is safe."),
                cue(10, "Breathe in gently through your nose for 4."),
                cue(20, "Hold for 7. Feel the pressure building slightly."),
                cue(35, "Exhale slowly through your mouth for 8. Let everything go."),
                cue(50, "Now focus on your toes. Let them go limp. Heavy. Sinking."),
                cue(80, "Your whole body is heavy. Sinking. Safe. Ready for sleep."),
            ],
        },
    ]
}

pub fn find_protocol(id: &str) -> Result<Protocol> {
    builtin_protocols()
        .into_iter()
        .find(|p| p.id == id)
        .ok_or_else(|| AudioError::UnknownProtocol(id.to_string()))
}
