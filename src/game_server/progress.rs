//! Progress - Checkpoint, lap and ranking bookkeeping
//!
//! The tracker owns one `RacerState` per registered racer and reads their
//! positions through a `PositionSource` each tick. It never moves anyone.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game_server::vehicle::VehicleState;

/// Smallest squared segment length used when projecting onto it
const MIN_SEGMENT_LENGTH_SQ: f32 = 1e-4;

/// Read-only lookup of racer positions by key
pub trait PositionSource {
    fn position_of(&self, key: usize) -> Option<Vec3>;
}

impl PositionSource for [Vec3] {
    fn position_of(&self, key: usize) -> Option<Vec3> {
        self.get(key).copied()
    }
}

impl PositionSource for Vec<Vec3> {
    fn position_of(&self, key: usize) -> Option<Vec3> {
        self.as_slice().position_of(key)
    }
}

impl PositionSource for [VehicleState] {
    fn position_of(&self, key: usize) -> Option<Vec3> {
        self.get(key).map(|v| v.position)
    }
}

impl PositionSource for Vec<VehicleState> {
    fn position_of(&self, key: usize) -> Option<Vec3> {
        self.as_slice().position_of(key)
    }
}

/// Handle returned at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RacerHandle(pub usize);

/// Race progress of a single participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RacerState {
    pub handle: RacerHandle,
    pub name: String,
    /// Key into the position source
    pub position_key: usize,
    pub lap_count: u32,
    pub next_checkpoint_index: usize,
    pub finished: bool,
    /// Ranking key, recomputed every tick
    pub progress_score: f32,
}

/// Transitions observed during one update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
    Checkpoint { racer: RacerHandle, index: usize },
    Lap { racer: RacerHandle, lap: u32 },
    Finished { racer: RacerHandle, time: f32 },
}

/// What the HUD shows for one racer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HudInfo {
    /// Lap being driven, 1-based and never above `total_laps`
    pub current_lap: u32,
    pub total_laps: u32,
    pub elapsed_seconds: f32,
    /// 1-based
    pub rank: usize,
    pub racer_count: usize,
}

fn planar(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Fraction of the way from `a` to `b`, clamped to `[0, 1]`
pub fn segment_fraction(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    let ab = planar(b - a);
    let ap = planar(p - a);
    let len_sq = ab.length_squared().max(MIN_SEGMENT_LENGTH_SQ);
    let t = ab.dot(ap) / len_sq;
    if t.is_nan() {
        0.0
    } else {
        t.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct RaceProgressTracker {
    checkpoints: Vec<Vec3>,
    total_laps: u32,
    checkpoint_radius: f32,
    racers: Vec<RacerState>,
    elapsed_seconds: f32,
}

impl RaceProgressTracker {
    /// Expects at least one checkpoint and one lap; the race config
    /// validation guarantees both.
    pub fn new(checkpoints: Vec<Vec3>, total_laps: u32, checkpoint_radius: f32) -> Self {
        Self {
            checkpoints,
            total_laps,
            checkpoint_radius,
            racers: Vec::new(),
            elapsed_seconds: 0.0,
        }
    }

    pub fn register_racer(&mut self, position_key: usize, name: impl Into<String>) -> RacerHandle {
        let handle = RacerHandle(self.racers.len());
        self.racers.push(RacerState {
            handle,
            name: name.into(),
            position_key,
            lap_count: 0,
            next_checkpoint_index: 0,
            finished: false,
            progress_score: 0.0,
        });
        handle
    }

    /// Advance checkpoints, laps and scores from the current positions
    pub fn update<P>(&mut self, dt: f32, positions: &P) -> Vec<ProgressEvent>
    where
        P: PositionSource + ?Sized,
    {
        self.elapsed_seconds += dt.max(0.0);

        let mut events = Vec::new();
        let n = self.checkpoints.len();
        if n == 0 {
            return events;
        }
        let radius_sq = self.checkpoint_radius * self.checkpoint_radius;

        for racer in self.racers.iter_mut().filter(|r| !r.finished) {
            let Some(pos) = positions.position_of(racer.position_key) else {
                continue;
            };

            let target = self.checkpoints[racer.next_checkpoint_index];
            if planar(pos - target).length_squared() <= radius_sq {
                log::debug!("{} passed checkpoint {}", racer.name, racer.next_checkpoint_index);
                events.push(ProgressEvent::Checkpoint {
                    racer: racer.handle,
                    index: racer.next_checkpoint_index,
                });
                racer.next_checkpoint_index = (racer.next_checkpoint_index + 1) % n;

                if racer.next_checkpoint_index == 0 {
                    racer.lap_count += 1;
                    log::info!("{} completed lap {}", racer.name, racer.lap_count);
                    events.push(ProgressEvent::Lap {
                        racer: racer.handle,
                        lap: racer.lap_count,
                    });

                    if racer.lap_count >= self.total_laps {
                        racer.finished = true;
                        log::info!("{} finished in {:.2}s", racer.name, self.elapsed_seconds);
                        events.push(ProgressEvent::Finished {
                            racer: racer.handle,
                            time: self.elapsed_seconds,
                        });
                    }
                }
            }

            let next = racer.next_checkpoint_index;
            let prev = (next + n - 1) % n;
            let t = segment_fraction(self.checkpoints[prev], self.checkpoints[next], pos);
            // The closing segment back to checkpoint 0 belongs to the lap just counted
            let lap = racer.lap_count as f32 - if next == 0 { 1.0 } else { 0.0 };
            racer.progress_score = lap * n as f32 + prev as f32 + t;
        }

        events
    }

    /// All racers, furthest ahead first; equal scores keep registration order
    pub fn ranking(&self) -> Vec<&RacerState> {
        let mut ranked: Vec<&RacerState> = self.racers.iter().collect();
        ranked.sort_by(|a, b| b.progress_score.total_cmp(&a.progress_score));
        ranked
    }

    /// 1-based position in the current ranking
    pub fn rank_of(&self, handle: RacerHandle) -> Option<usize> {
        self.ranking()
            .iter()
            .position(|r| r.handle == handle)
            .map(|i| i + 1)
    }

    pub fn racer(&self, handle: RacerHandle) -> Option<&RacerState> {
        self.racers.get(handle.0)
    }

    pub fn racers(&self) -> &[RacerState] {
        &self.racers
    }

    pub fn hud(&self, handle: RacerHandle) -> Option<HudInfo> {
        let racer = self.racer(handle)?;
        Some(HudInfo {
            current_lap: (racer.lap_count + 1).min(self.total_laps),
            total_laps: self.total_laps,
            elapsed_seconds: self.elapsed_seconds,
            rank: self.rank_of(handle)?,
            racer_count: self.racers.len(),
        })
    }

    pub fn all_finished(&self) -> bool {
        !self.racers.is_empty() && self.racers.iter().all(|r| r.finished)
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed_seconds
    }

    pub fn total_laps(&self) -> u32 {
        self.total_laps
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn checkpoints(&self) -> &[Vec3] {
        &self.checkpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::new(0.0, 0.5, -20.0),
            Vec3::new(20.0, 0.5, -20.0),
            Vec3::new(20.0, 0.5, 0.0),
        ]
    }

    #[test]
    fn test_checkpoints_advance_and_wrap() {
        let checkpoints = ring();
        let mut tracker = RaceProgressTracker::new(checkpoints.clone(), 3, 3.5);
        let racer = tracker.register_racer(0, "Player");

        for (step, cp) in checkpoints.iter().enumerate() {
            let before = tracker.racer(racer).unwrap().next_checkpoint_index;
            tracker.update(0.1, &vec![*cp]);
            let state = tracker.racer(racer).unwrap();
            assert_eq!(state.next_checkpoint_index, (before + 1) % 4, "step {}", step);
        }
        let state = tracker.racer(racer).unwrap();
        assert_eq!(state.lap_count, 1);
        assert!(!state.finished);
    }

    #[test]
    fn test_height_is_ignored() {
        let mut tracker = RaceProgressTracker::new(ring(), 1, 3.5);
        let racer = tracker.register_racer(0, "Player");
        tracker.update(0.1, &vec![Vec3::new(1.0, 40.0, 1.0)]);
        assert_eq!(tracker.racer(racer).unwrap().next_checkpoint_index, 1);
    }

    #[test]
    fn test_three_laps_finish_and_stay_finished() {
        let checkpoints = ring();
        let mut tracker = RaceProgressTracker::new(checkpoints.clone(), 3, 3.5);
        let racer = tracker.register_racer(0, "Player");

        let mut finished_events = 0;
        for lap in 0..3 {
            for cp in &checkpoints {
                assert!(!tracker.racer(racer).unwrap().finished, "finished early on lap {}", lap);
                let events = tracker.update(0.5, &vec![*cp]);
                finished_events += events
                    .iter()
                    .filter(|e| matches!(e, ProgressEvent::Finished { .. }))
                    .count();
            }
        }
        let state = tracker.racer(racer).unwrap().clone();
        assert!(state.finished);
        assert_eq!(state.lap_count, 3);
        assert_eq!(finished_events, 1);

        for _ in 0..10 {
            tracker.update(0.5, &vec![Vec3::new(500.0, 0.0, 500.0)]);
        }
        let after = tracker.racer(racer).unwrap();
        assert!(after.finished);
        assert_eq!(after.lap_count, 3);
        assert_eq!(after.progress_score, state.progress_score);
        assert_eq!(tracker.hud(racer).unwrap().current_lap, 3);
    }

    #[test]
    fn test_progress_is_monotone_along_segment() {
        let mut tracker = RaceProgressTracker::new(ring(), 3, 3.5);
        let racer = tracker.register_racer(0, "Player");
        tracker.update(0.0, &vec![Vec3::ZERO]);

        let mut last = tracker.racer(racer).unwrap().progress_score;
        assert_eq!(last, 0.0);
        // Past checkpoint 0's radius, heading for checkpoint 1
        for i in 4..=16 {
            tracker.update(0.1, &vec![Vec3::new(0.0, 0.5, -(i as f32))]);
            let score = tracker.racer(racer).unwrap().progress_score;
            assert!(score >= last);
            assert!(score < 1.0);
            last = score;
        }
        assert!((last - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_progress_is_continuous_across_laps() {
        let checkpoints = ring();
        let mut tracker = RaceProgressTracker::new(checkpoints.clone(), 3, 3.5);
        let racer = tracker.register_racer(0, "Player");

        // Behind the start line counts as not yet started
        tracker.update(0.1, &vec![Vec3::new(10.0, 0.5, 0.0)]);
        let mut last = tracker.racer(racer).unwrap().progress_score;
        assert!(last < 0.0);

        let mut path = Vec::new();
        for _ in 0..2 {
            for i in 0..checkpoints.len() {
                let a = checkpoints[i];
                let b = checkpoints[(i + 1) % checkpoints.len()];
                for k in 0..10 {
                    path.push(a.lerp(b, k as f32 / 10.0));
                }
            }
        }
        for p in path {
            tracker.update(0.1, &vec![p]);
            let score = tracker.racer(racer).unwrap().progress_score;
            assert!(score >= last, "score dropped from {} to {}", last, score);
            assert!(score - last < 1.0);
            last = score;
        }
        assert_eq!(tracker.racer(racer).unwrap().lap_count, 2);
    }

    #[test]
    fn test_fraction_clamps_and_guards_degenerate_segment() {
        let a = Vec3::ZERO;
        let b = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(segment_fraction(a, b, Vec3::new(-5.0, 0.0, 0.0)), 0.0);
        assert_eq!(segment_fraction(a, b, Vec3::new(25.0, 0.0, 3.0)), 1.0);
        assert!((segment_fraction(a, b, Vec3::new(2.5, 0.0, 9.0)) - 0.25).abs() < 1e-6);
        assert_eq!(segment_fraction(a, a, Vec3::ZERO), 0.0);
        assert!(segment_fraction(a, a, Vec3::new(1.0, 0.0, 0.0)).is_finite());
    }

    #[test]
    fn test_ranking_is_sorted_permutation() {
        let mut tracker = RaceProgressTracker::new(ring(), 3, 3.5);
        let names = ["A", "B", "C", "D"];
        let handles: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| tracker.register_racer(i, *n))
            .collect();

        let positions = vec![
            Vec3::new(30.0, 0.0, 30.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -10.0),
            Vec3::new(0.0, 0.0, -1.0),
        ];
        tracker.update(0.1, &positions);
        tracker.update(0.1, &vec![
            positions[0],
            Vec3::new(0.0, 0.0, -15.0),
            positions[2],
            positions[3],
        ]);

        let ranking = tracker.ranking();
        assert_eq!(ranking.len(), 4);
        for pair in ranking.windows(2) {
            assert!(pair[0].progress_score >= pair[1].progress_score);
        }
        let mut seen: Vec<_> = ranking.iter().map(|r| r.handle).collect();
        seen.sort_by_key(|h| h.0);
        assert_eq!(seen, handles);

        assert_eq!(ranking[0].name, "B");
        assert_eq!(tracker.rank_of(handles[1]), Some(1));
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let mut tracker = RaceProgressTracker::new(ring(), 3, 3.5);
        // Registration order differs from position key order
        let first = tracker.register_racer(2, "First");
        let second = tracker.register_racer(0, "Second");
        let leader = tracker.register_racer(1, "Leader");

        let side_by_side = Vec3::new(0.0, 0.5, -2.0);
        let positions = vec![side_by_side, Vec3::new(0.0, 0.5, -3.0), side_by_side];
        tracker.update(0.1, &positions);

        let a = tracker.racer(first).unwrap();
        let b = tracker.racer(second).unwrap();
        assert_eq!(a.next_checkpoint_index, 1);
        assert_eq!(a.progress_score, b.progress_score);
        assert!((a.progress_score - 0.1).abs() < 1e-6);

        let order: Vec<RacerHandle> = tracker.ranking().iter().map(|r| r.handle).collect();
        assert_eq!(order, vec![leader, first, second]);
        assert_eq!(tracker.rank_of(first), Some(2));
        assert_eq!(tracker.rank_of(second), Some(3));
    }

    #[test]
    fn test_missing_position_is_skipped() {
        let mut tracker = RaceProgressTracker::new(ring(), 3, 3.5);
        let racer = tracker.register_racer(5, "Ghost");
        tracker.update(0.25, &vec![Vec3::ZERO]);
        assert_eq!(tracker.racer(racer).unwrap().next_checkpoint_index, 0);
        assert_eq!(tracker.elapsed_seconds(), 0.25);
    }

    #[test]
    fn test_reads_vehicle_states() {
        let mut tracker = RaceProgressTracker::new(ring(), 3, 3.5);
        let racer = tracker.register_racer(1, "Bot");
        let vehicles = vec![
            VehicleState::new(Vec3::new(100.0, 0.0, 0.0), 0.0),
            VehicleState::new(Vec3::new(0.5, 0.5, 0.5), 0.0),
        ];
        tracker.update(0.1, &vehicles);
        assert_eq!(tracker.racer(racer).unwrap().next_checkpoint_index, 1);
    }

    #[test]
    fn test_hud_info() {
        let mut tracker = RaceProgressTracker::new(ring(), 3, 3.5);
        let a = tracker.register_racer(0, "A");
        let b = tracker.register_racer(1, "B");
        tracker.update(1.5, &vec![Vec3::new(50.0, 0.0, 50.0), Vec3::ZERO]);

        let hud = tracker.hud(a).unwrap();
        assert_eq!(hud.current_lap, 1);
        assert_eq!(hud.total_laps, 3);
        assert_eq!(hud.rank, 2);
        assert_eq!(hud.racer_count, 2);
        assert_eq!(hud.elapsed_seconds, 1.5);
        assert_eq!(tracker.hud(b).unwrap().rank, 1);
    }
}
