//! Randomized greedy slot filling. No backtracking and no cross-section checks:
//! the slot grid is shuffled once and allocations take slots in order.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DAYS_PER_WEEK: u8 = 6;
pub const PERIODS_PER_DAY: u8 = 8;
pub const PERIOD_MINUTES: u32 = 45;
pub const DAY_START_MINUTES: u32 = 8 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub subject_id: String,
    #[serde(default)]
    pub teacher_id: Option<String>,
    pub periods_per_week: u32,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub day_of_week: u8,
    pub period_number: u8,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub day_of_week: u8,
    pub period_number: u8,
    pub start_time: String,
    pub end_time: String,
    pub subject_id: String,
    pub teacher_id: Option<String>,
    pub room_id: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("Not enough time slots available.")]
    NotEnoughSlots { requested: u32, available: u32 },

    #[error("periodsPerWeek must be at least 1")]
    EmptyAllocation { index: usize },
}

fn clock(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// `(start, end)` as `HH:MM` for a 1-based period number.
pub fn period_times(period_number: u8) -> (String, String) {
    let start = DAY_START_MINUTES + PERIOD_MINUTES * u32::from(period_number.saturating_sub(1));
    (clock(start), clock(start + PERIOD_MINUTES))
}

pub fn all_slots() -> Vec<Slot> {
    (1..=DAYS_PER_WEEK)
        .flat_map(|day| {
            (1..=PERIODS_PER_DAY).map(move |period| Slot {
                day_of_week: day,
                period_number: period,
            })
        })
        .collect()
}

pub fn generate<R: Rng + ?Sized>(
    allocations: &[Allocation],
    rng: &mut R,
) -> Result<Vec<Placement>, GenerateError> {
    if let Some(index) = allocations.iter().position(|a| a.periods_per_week == 0) {
        return Err(GenerateError::EmptyAllocation { index });
    }

    let mut slots = all_slots();
    let available = slots.len() as u32;
    let requested: u32 = allocations
        .iter()
        .map(|a| a.periods_per_week)
        .fold(0u32, |acc, n| acc.saturating_add(n));
    if requested > available {
        return Err(GenerateError::NotEnoughSlots {
            requested,
            available,
        });
    }

    slots.shuffle(rng);

    let mut next = slots.into_iter();
    let mut placements = Vec::with_capacity(requested as usize);
    for a in allocations {
        for _ in 0..a.periods_per_week {
            // requested <= available, so the iterator cannot run dry here.
            let Some(slot) = next.next() else { break };
            let (start_time, end_time) = period_times(slot.period_number);
            placements.push(Placement {
                day_of_week: slot.day_of_week,
                period_number: slot.period_number,
                start_time,
                end_time,
                subject_id: a.subject_id.clone(),
                teacher_id: a.teacher_id.clone(),
                room_id: a.room_id.clone(),
            });
        }
    }
    placements.sort_by_key(|p| (p.day_of_week, p.period_number));
    Ok(placements)
}
