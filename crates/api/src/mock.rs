//! Randomized sensor payloads

use chrono::{DateTime, Duration, Utc};
use coordinator::{DrowsinessReading, HeadPoseReading};
use dms::AlertStatus;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// EAR below which a generated reading is drowsy
pub const DROWSY_EAR: f32 = 0.25;

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Pick from `choices` by relative weight
fn weighted<T: Copy, R: Rng + ?Sized>(rng: &mut R, choices: &[(T, f64)]) -> T {
    let total: f64 = choices.iter().map(|(_, w)| w).sum();
    let mut roll = rng.gen::<f64>() * total;
    for (value, weight) in choices {
        if roll < *weight {
            return *value;
        }
        roll -= weight;
    }
    choices[0].0
}

pub fn drowsiness<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> DrowsinessReading {
    let ear = round_to(0.20 + rng.gen::<f64>() * 0.15, 2) as f32;
    let is_drowsy = ear < DROWSY_EAR;
    let mut axis = || round_to(rng.gen::<f64>() * 20.0 - 10.0, 1) as f32;
    let head_pose = HeadPoseReading {
        x: axis(),
        y: axis(),
        z: axis(),
    };
    let level: u8 = if is_drowsy {
        rng.gen_range(70..100)
    } else {
        rng.gen_range(5..35)
    };

    DrowsinessReading {
        ear_value: ear,
        is_drowsy,
        blink_count: rng.gen_range(5..30),
        yawn_count: rng.gen_range(0..5),
        head_pose: Some(head_pose),
        drowsiness_level: level,
        alert_status: AlertStatus::from_level(level),
        timestamp: Some(now),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Neutral,
}

const EMOTIONS: [Emotion; 4] = [Emotion::Happy, Emotion::Sad, Emotion::Angry, Emotion::Neutral];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    pub emotion: Emotion,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    pub current_emotion: Emotion,
    pub confidence: f64,
    pub emotion_history: Vec<EmotionSample>,
    pub timestamp: DateTime<Utc>,
}

pub fn emotion<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> EmotionReading {
    let current = weighted(
        rng,
        &[
            (Emotion::Neutral, 0.4),
            (Emotion::Happy, 0.2),
            (Emotion::Sad, 0.2),
            (Emotion::Angry, 0.2),
        ],
    );
    let confidence = match current {
        Emotion::Neutral => 0.7 + rng.gen::<f64>() * 0.3,
        _ => 0.5 + rng.gen::<f64>() * 0.4,
    };

    let emotion_history = (0..5)
        .map(|i| EmotionSample {
            emotion: EMOTIONS[rng.gen_range(0..EMOTIONS.len())],
            confidence: round_to(0.5 + rng.gen::<f64>() * 0.5, 2),
            timestamp: now - Duration::seconds(2 * i),
        })
        .collect();

    EmotionReading {
        current_emotion: current,
        confidence: round_to(confidence, 2),
        emotion_history,
        timestamp: now,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneReading {
    pub is_detected: bool,
    pub confidence: f64,
    pub last_detected: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

pub fn phone<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> PhoneReading {
    let is_detected = rng.gen_bool(0.2);
    let (confidence, last_detected) = if is_detected {
        (round_to(0.6 + rng.gen::<f64>() * 0.4, 2), Some(now))
    } else if rng.gen_bool(0.5) {
        let minutes = rng.gen_range(1..120);
        (0.0, Some(now - Duration::minutes(minutes)))
    } else {
        (0.0, None)
    };

    PhoneReading {
        is_detected,
        confidence,
        last_detected,
        timestamp: now,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartRateStatus {
    Normal,
    Low,
    Elevated,
    High,
}

impl HeartRateStatus {
    pub fn from_bpm(bpm: u32) -> Self {
        match bpm {
            0..=59 => HeartRateStatus::Low,
            60..=100 => HeartRateStatus::Normal,
            101..=120 => HeartRateStatus::Elevated,
            _ => HeartRateStatus::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub bpm: u32,
    pub status: HeartRateStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateReading {
    pub bpm: u32,
    pub status: HeartRateStatus,
    pub history: Vec<HeartRateSample>,
    pub timestamp: DateTime<Utc>,
}

pub fn heart_rate<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> HeartRateReading {
    let status = weighted(
        rng,
        &[
            (HeartRateStatus::Normal, 0.7),
            (HeartRateStatus::Low, 0.1),
            (HeartRateStatus::Elevated, 0.15),
            (HeartRateStatus::High, 0.05),
        ],
    );
    let bpm: u32 = match status {
        HeartRateStatus::Low => rng.gen_range(40..60),
        HeartRateStatus::Normal => rng.gen_range(60..100),
        HeartRateStatus::Elevated => rng.gen_range(100..120),
        HeartRateStatus::High => rng.gen_range(120..180),
    };

    let history = (0..10)
        .map(|i| {
            let varied = (bpm as i64 + rng.gen_range(-5..5)).clamp(40, 180) as u32;
            HeartRateSample {
                bpm: varied,
                status: HeartRateStatus::from_bpm(varied),
                timestamp: now - Duration::seconds(5 * i),
            }
        })
        .collect();

    HeartRateReading {
        bpm,
        status,
        history,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_drowsiness_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc::now();
        for _ in 0..500 {
            let reading = drowsiness(&mut rng, now);
            assert!((0.20..=0.35).contains(&reading.ear_value));
            assert_eq!(reading.is_drowsy, reading.ear_value < DROWSY_EAR);
            if reading.is_drowsy {
                assert!((70..100).contains(&reading.drowsiness_level));
            } else {
                assert!((5..35).contains(&reading.drowsiness_level));
            }
            assert_eq!(
                reading.alert_status,
                AlertStatus::from_level(reading.drowsiness_level)
            );
            let pose = reading.head_pose.unwrap();
            for axis in [pose.x, pose.y, pose.z] {
                assert!((-10.0..=10.0).contains(&axis));
            }
        }
    }

    #[test]
    fn test_emotion_history() {
        let mut rng = StdRng::seed_from_u64(11);
        let now = Utc::now();
        let reading = emotion(&mut rng, now);

        assert_eq!(reading.emotion_history.len(), 5);
        assert_eq!(reading.emotion_history[0].timestamp, now);
        assert_eq!(
            reading.emotion_history[4].timestamp,
            now - Duration::seconds(8)
        );
        if reading.current_emotion == Emotion::Neutral {
            assert!(reading.confidence >= 0.7);
        } else {
            assert!(reading.confidence <= 0.9);
        }
    }

    #[test]
    fn test_phone_confidence_only_when_detected() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc::now();
        let mut detected = 0;
        for _ in 0..1000 {
            let reading = phone(&mut rng, now);
            if reading.is_detected {
                detected += 1;
                assert!(reading.confidence >= 0.6);
                assert_eq!(reading.last_detected, Some(now));
            } else {
                assert_eq!(reading.confidence, 0.0);
                if let Some(last) = reading.last_detected {
                    assert!(last < now);
                }
            }
        }
        assert!((100..300).contains(&detected));
    }

    #[test]
    fn test_heart_rate_history_status_matches_bpm() {
        let mut rng = StdRng::seed_from_u64(5);
        let reading = heart_rate(&mut rng, Utc::now());

        assert_eq!(reading.history.len(), 10);
        for sample in &reading.history {
            assert!((40..=180).contains(&sample.bpm));
            assert_eq!(sample.status, HeartRateStatus::from_bpm(sample.bpm));
            assert!(sample.bpm.abs_diff(reading.bpm) <= 5);
        }
    }

    #[test]
    fn test_heart_rate_status_boundaries() {
        assert_eq!(HeartRateStatus::from_bpm(59), HeartRateStatus::Low);
        assert_eq!(HeartRateStatus::from_bpm(60), HeartRateStatus::Normal);
        assert_eq!(HeartRateStatus::from_bpm(100), HeartRateStatus::Normal);
        assert_eq!(HeartRateStatus::from_bpm(120), HeartRateStatus::Elevated);
        assert_eq!(HeartRateStatus::from_bpm(121), HeartRateStatus::High);
    }
}
