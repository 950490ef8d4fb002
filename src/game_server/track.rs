//! Track - Procedural track generation
//!
//! Builds the closed racing loop once per race: a Catmull-Rom centerline,
//! the road ribbon mesh, waypoint rings for the AI (main and shortcut),
//! the checkpoint subsequence used for lap counting, and seeded decorative
//! rocks. Everything here is a pure function of `TrackParams`.

use glam::Vec3;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::game_server::error::RaceError;

/// UV repeat distance along the ribbon, in segments
const UV_SEGMENTS_PER_TILE: f32 = 8.0;
/// Roughly one checkpoint per this many waypoints
const WAYPOINTS_PER_CHECKPOINT: usize = 10;
const MIN_CHECKPOINTS: usize = 3;

/// Track generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackParams {
    /// Loop radius along X
    pub radius_x: f32,
    /// Loop radius along Z
    pub radius_z: f32,
    /// Amplitude of the sinusoidal radius perturbation
    pub radius_wobble: f32,
    /// Control points fed to the spline
    pub control_points: usize,
    pub road_half_width: f32,
    /// Ribbon segments around the loop
    pub road_segments: usize,
    pub waypoint_sample_count: usize,
    /// Height the AI navigates at
    pub waypoint_height: f32,
    pub checkpoint_height: f32,
    /// Point the shortcut is spliced in next to
    pub detour_anchor: Vec3,
    /// Alternate waypoints replacing the main ring around the anchor
    pub detour: Vec<Vec3>,
    pub obstacle_count: usize,
    pub scatter_radius: f32,
    pub obstacle_height: f32,
    /// Seed for the decorative scatter
    pub seed: u32,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            radius_x: 18.0,
            radius_z: 12.0,
            radius_wobble: 2.0,
            control_points: 32,
            road_half_width: 3.2,
            road_segments: 256,
            waypoint_sample_count: 120,
            waypoint_height: 0.5,
            checkpoint_height: 0.5,
            detour_anchor: Vec3::new(-10.0, 0.4, 0.0),
            detour: vec![
                Vec3::new(-15.6, 0.5, -2.6),
                Vec3::new(-14.6, 0.5, -3.3),
                Vec3::new(-13.9, 0.5, -4.1),
                Vec3::new(-13.7, 0.5, -5.0),
                Vec3::new(-13.9, 0.5, -5.6),
            ],
            obstacle_count: 80,
            scatter_radius: 45.0,
            obstacle_height: 0.3,
            seed: 42,
        }
    }
}

impl TrackParams {
    /// Reject parameter sets that would break the track invariants
    pub fn validate(&self) -> Result<(), RaceError> {
        if self.control_points < 3 {
            return Err(RaceError::InvalidConfig(
                "track needs at least 3 control points".into(),
            ));
        }
        if self.radius_x <= self.radius_wobble || self.radius_z <= self.radius_wobble {
            return Err(RaceError::InvalidConfig(
                "loop radii must exceed the wobble amplitude".into(),
            ));
        }
        if self.road_half_width.is_nan() || self.road_half_width <= 0.0 {
            return Err(RaceError::InvalidConfig(
                "road half width must be positive".into(),
            ));
        }
        if self.road_segments < 3 || self.waypoint_sample_count < MIN_CHECKPOINTS {
            return Err(RaceError::InvalidConfig(format!(
                "need at least 3 road segments and {} waypoints",
                MIN_CHECKPOINTS
            )));
        }
        if self.detour.len() > self.waypoint_sample_count {
            return Err(RaceError::InvalidConfig(
                "shortcut detour is longer than the waypoint ring".into(),
            ));
        }
        Ok(())
    }
}

/// Linear congruential generator used for the decorative scatter.
///
/// Same seed, same sequence, on every platform.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    const MULTIPLIER: u32 = 1_664_525;
    const INCREMENT: u32 = 1_013_904_223;

    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next value in `[0, 1)`
    pub fn next_unit(&mut self) -> f64 {
        unit_interval(self)
    }
}

impl RngCore for Lcg {
    fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        self.state
    }

    fn next_u64(&mut self) -> u64 {
        let lo = self.next_u32() as u64;
        let hi = self.next_u32() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Next 32-bit draw scaled into `[0, 1)`
fn unit_interval<R: RngCore + ?Sized>(rng: &mut R) -> f64 {
    rng.next_u32() as f64 / 4_294_967_296.0
}

/// Closed uniform Catmull-Rom spline
#[derive(Debug, Clone)]
pub struct ClosedCurve {
    points: Vec<Vec3>,
}

impl ClosedCurve {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self { points }
    }

    pub fn control_points(&self) -> &[Vec3] {
        &self.points
    }

    /// Segment index, local parameter and the four neighbours for `t` in `[0, 1)`
    fn segment(&self, t: f32) -> (f32, [Vec3; 4]) {
        let n = self.points.len();
        let f = t.rem_euclid(1.0) * n as f32;
        let i = (f.floor() as usize) % n;
        let u = f - f.floor();
        (
            u,
            [
                self.points[(i + n - 1) % n],
                self.points[i],
                self.points[(i + 1) % n],
                self.points[(i + 2) % n],
            ],
        )
    }

    pub fn point_at(&self, t: f32) -> Vec3 {
        let (u, [p0, p1, p2, p3]) = self.segment(t);
        let u2 = u * u;
        let u3 = u2 * u;
        0.5 * (2.0 * p1
            + (p2 - p0) * u
            + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * u2
            + (3.0 * p1 - p0 - 3.0 * p2 + p3) * u3)
    }

    /// Unit tangent, continuous across the seam
    pub fn tangent_at(&self, t: f32) -> Vec3 {
        let (u, [p0, p1, p2, p3]) = self.segment(t);
        let d = 0.5
            * ((p2 - p0)
                + 2.0 * (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * u
                + 3.0 * (3.0 * p1 - p0 - 3.0 * p2 + p3) * u * u);
        if d.is_finite() && d.length_squared() > 1e-12 {
            d.normalize()
        } else {
            (p2 - p1).normalize_or_zero()
        }
    }
}

/// Perturbed oval the spline runs through
pub fn control_points(params: &TrackParams) -> Vec<Vec3> {
    (0..params.control_points)
        .map(|i| {
            let a = i as f32 / params.control_points as f32 * TAU;
            let x = a.cos() * (params.radius_x + (a * 3.0).sin() * params.radius_wobble);
            let z = a.sin() * (params.radius_z + (a * 2.0).cos() * params.radius_wobble);
            Vec3::new(x, 0.0, z)
        })
        .collect()
}

/// Vertex of the road ribbon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackMesh {
    pub vertices: Vec<TrackVertex>,
    pub indices: Vec<u32>,
}

/// Decorative rock, no gameplay effect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub position: Vec3,
    /// Euler rotation in radians
    pub rotation: Vec3,
}

/// Left/right edge pairs along the curve, two triangles per segment,
/// closed back onto the first pair.
pub fn build_road_mesh(curve: &ClosedCurve, half_width: f32, segments: usize) -> TrackMesh {
    let mut vertices = Vec::with_capacity(segments * 2);
    let mut indices = Vec::with_capacity(segments * 6);

    for i in 0..segments {
        let t = i as f32 / segments as f32;
        let center = curve.point_at(t);
        let side = curve.tangent_at(t).cross(Vec3::Y).normalize_or_zero();
        let v = i as f32 / UV_SEGMENTS_PER_TILE;

        for (offset, u) in [(-half_width, 0.0), (half_width, 1.0)] {
            vertices.push(TrackVertex {
                position: (center + side * offset).to_array(),
                normal: Vec3::Y.to_array(),
                uv: [u, v],
            });
        }
    }

    for i in 0..segments {
        let a = (i * 2) as u32;
        let b = a + 1;
        let c = (((i + 1) % segments) * 2) as u32;
        let d = c + 1;
        indices.extend_from_slice(&[a, b, c, b, d, c]);
    }

    TrackMesh { vertices, indices }
}

/// Uniform parametric samples of the curve at a fixed height
pub fn sample_waypoints(curve: &ClosedCurve, count: usize, height: f32) -> Vec<Vec3> {
    (0..count)
        .map(|i| {
            let p = curve.point_at(i as f32 / count as f32);
            Vec3::new(p.x, height, p.z)
        })
        .collect()
}

/// Index of the waypoint closest to `anchor`
pub fn nearest_waypoint(waypoints: &[Vec3], anchor: Vec3) -> Option<usize> {
    waypoints
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.distance_squared(anchor)
                .total_cmp(&b.distance_squared(anchor))
        })
        .map(|(i, _)| i)
}

/// Copy of `main` with the run around the anchor replaced by `detour`.
///
/// The run is centred on the nearest waypoint and wraps past either end of
/// the ring, so the result always has `main.len()` entries.
pub fn splice_shortcut(main: &[Vec3], anchor: Vec3, detour: &[Vec3]) -> Vec<Vec3> {
    let mut path = main.to_vec();
    let len = path.len();
    let Some(nearest) = nearest_waypoint(main, anchor) else {
        return path;
    };

    let run = detour.len().min(len);
    let start = (nearest + len - run / 2) % len;
    for (k, point) in detour.iter().take(run).enumerate() {
        path[(start + k) % len] = *point;
    }
    path
}

/// Every Nth waypoint, about a tenth of the ring and never fewer than three
pub fn checkpoint_indices(waypoint_count: usize) -> Vec<usize> {
    let count = (waypoint_count / WAYPOINTS_PER_CHECKPOINT)
        .max(MIN_CHECKPOINTS)
        .min(waypoint_count);
    if count == 0 {
        return Vec::new();
    }
    let step = waypoint_count / count;
    (0..count).map(|i| i * step).collect()
}

/// Seeded decorative scatter inside a disc
pub fn scatter_obstacles<R: RngCore + ?Sized>(
    rng: &mut R,
    count: usize,
    radius: f32,
    height: f32,
) -> Vec<Obstacle> {
    (0..count)
        .map(|_| {
            let r = radius * (unit_interval(rng) as f32).sqrt();
            let a = unit_interval(rng) as f32 * TAU;
            let rotation = Vec3::new(
                unit_interval(rng) as f32 * 3.0,
                unit_interval(rng) as f32 * 3.0,
                unit_interval(rng) as f32 * 3.0,
            );
            Obstacle {
                position: Vec3::new(a.cos() * r, height, a.sin() * r),
                rotation,
            }
        })
        .collect()
}

/// Generated track, immutable once built
#[derive(Debug, Clone, Serialize)]
pub struct TrackDefinition {
    pub centerline: Vec<Vec3>,
    pub road_half_width: f32,
    pub waypoints_main: Vec<Vec3>,
    pub waypoints_shortcut: Vec<Vec3>,
    pub checkpoints: Vec<Vec3>,
    /// Position of each checkpoint within `waypoints_main`
    pub checkpoint_indices: Vec<usize>,
    pub road: TrackMesh,
    pub obstacles: Vec<Obstacle>,
}

/// Read-only navigation side of a track
#[derive(Debug, Clone, Copy)]
pub struct NavigationData<'a> {
    pub waypoints_main: &'a [Vec3],
    pub waypoints_shortcut: &'a [Vec3],
    pub checkpoints: &'a [Vec3],
}

/// Read-only render side of a track
#[derive(Debug, Clone, Copy)]
pub struct MeshView<'a> {
    pub road: &'a TrackMesh,
    pub obstacles: &'a [Obstacle],
    pub centerline: &'a [Vec3],
}

impl TrackDefinition {
    /// Build the full track from parameters
    pub fn generate(params: &TrackParams) -> Self {
        let centerline = control_points(params);
        let curve = ClosedCurve::new(centerline.clone());

        let road = build_road_mesh(&curve, params.road_half_width, params.road_segments);

        let waypoints_main = sample_waypoints(
            &curve,
            params.waypoint_sample_count,
            params.waypoint_height,
        );
        let waypoints_shortcut =
            splice_shortcut(&waypoints_main, params.detour_anchor, &params.detour);

        let checkpoint_indices = checkpoint_indices(waypoints_main.len());
        let checkpoints = checkpoint_indices
            .iter()
            .map(|&i| {
                let w = waypoints_main[i];
                Vec3::new(w.x, params.checkpoint_height, w.z)
            })
            .collect();

        let mut rng = Lcg::new(params.seed);
        let obstacles = scatter_obstacles(
            &mut rng,
            params.obstacle_count,
            params.scatter_radius,
            params.obstacle_height,
        );

        log::debug!(
            "Generated track: {} waypoints, {} checkpoints, {} road vertices",
            waypoints_main.len(),
            checkpoint_indices.len(),
            road.vertices.len()
        );

        Self {
            centerline,
            road_half_width: params.road_half_width,
            waypoints_main,
            waypoints_shortcut,
            checkpoints,
            checkpoint_indices,
            road,
            obstacles,
        }
    }

    pub fn navigation(&self) -> NavigationData<'_> {
        NavigationData {
            waypoints_main: &self.waypoints_main,
            waypoints_shortcut: &self.waypoints_shortcut,
            checkpoints: &self.checkpoints,
        }
    }

    pub fn mesh_view(&self) -> MeshView<'_> {
        MeshView {
            road: &self.road,
            obstacles: &self.obstacles,
            centerline: &self.centerline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let params = TrackParams::default();
        let a = TrackDefinition::generate(&params);
        let b = TrackDefinition::generate(&params);

        assert_eq!(a.waypoints_main, b.waypoints_main);
        assert_eq!(a.checkpoints, b.checkpoints);
        assert_eq!(a.waypoints_shortcut, b.waypoints_shortcut);
        assert_eq!(a.obstacles, b.obstacles);
    }

    #[test]
    fn test_default_track_invariants() {
        let track = TrackDefinition::generate(&TrackParams::default());

        assert_eq!(track.centerline.len(), 32);
        for (i, p) in track.centerline.iter().enumerate() {
            let next = track.centerline[(i + 1) % track.centerline.len()];
            assert!(p.distance_squared(next) > 1e-6);
        }
        assert_eq!(track.waypoints_main.len(), 120);
        assert_eq!(track.waypoints_shortcut.len(), track.waypoints_main.len());
        assert_eq!(track.checkpoints.len(), 12);
        assert_eq!(track.checkpoint_indices[0], 0);
        assert!(track
            .checkpoint_indices
            .windows(2)
            .all(|w| w[0] < w[1]));
        assert!(track.waypoints_main.iter().all(|w| w.y == 0.5));
    }

    #[test]
    fn test_curve_passes_through_control_points() {
        let curve = ClosedCurve::new(control_points(&TrackParams::default()));
        let n = curve.control_points().len();
        for (i, p) in curve.control_points().iter().enumerate() {
            let q = curve.point_at(i as f32 / n as f32);
            assert!(p.distance(q) < 1e-3, "control point {} off curve", i);
        }
    }

    #[test]
    fn test_curve_closes_smoothly() {
        let curve = ClosedCurve::new(control_points(&TrackParams::default()));
        let before = curve.tangent_at(0.9999);
        let after = curve.tangent_at(0.0);
        assert!(before.dot(after) > 0.99);
        assert!(curve.point_at(0.9999).distance(curve.point_at(0.0)) < 0.05);
    }

    #[test]
    fn test_road_mesh_closes_ring() {
        let curve = ClosedCurve::new(control_points(&TrackParams::default()));
        let mesh = build_road_mesh(&curve, 3.2, 16);

        assert_eq!(mesh.vertices.len(), 32);
        assert_eq!(mesh.indices.len(), 16 * 6);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        // Last segment stitches back to the first vertex pair
        let tail = &mesh.indices[mesh.indices.len() - 6..];
        assert_eq!(tail, &[30, 31, 0, 31, 1, 0]);

        for pair in mesh.vertices.chunks(2) {
            let l = Vec3::from_array(pair[0].position);
            let r = Vec3::from_array(pair[1].position);
            assert!((l.distance(r) - 6.4).abs() < 1e-3);
        }
    }

    #[test]
    fn test_splice_keeps_length_and_wraps() {
        let main: Vec<Vec3> = (0..10).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
        let detour = vec![Vec3::splat(-1.0), Vec3::splat(-2.0), Vec3::splat(-3.0)];

        // Nearest is index 0, so the run starts at the end of the ring
        let path = splice_shortcut(&main, Vec3::new(-0.2, 0.0, 0.0), &detour);
        assert_eq!(path.len(), main.len());
        assert_eq!(path[9], Vec3::splat(-1.0));
        assert_eq!(path[0], Vec3::splat(-2.0));
        assert_eq!(path[1], Vec3::splat(-3.0));
        assert_eq!(&path[2..9], &main[2..9]);
    }

    #[test]
    fn test_splice_with_oversized_detour() {
        let main: Vec<Vec3> = (0..3).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
        let detour: Vec<Vec3> = (0..5).map(|i| Vec3::splat(-(i as f32))).collect();
        assert_eq!(splice_shortcut(&main, Vec3::ZERO, &detour).len(), 3);
    }

    #[test]
    fn test_shortcut_keeps_checkpoint_waypoints() {
        let track = TrackDefinition::generate(&TrackParams::default());
        let changed: Vec<usize> = (0..track.waypoints_main.len())
            .filter(|&i| track.waypoints_main[i] != track.waypoints_shortcut[i])
            .collect();

        assert_eq!(changed.len(), 5);
        for i in changed {
            assert!(!track.checkpoint_indices.contains(&i));
        }
    }

    #[test]
    fn test_checkpoint_counts() {
        assert_eq!(checkpoint_indices(120), (0..12).map(|i| i * 10).collect::<Vec<_>>());
        assert_eq!(checkpoint_indices(12), vec![0, 4, 8]);
        assert_eq!(checkpoint_indices(3), vec![0, 1, 2]);
        assert_eq!(checkpoint_indices(35).len(), 3);
    }

    #[test]
    fn test_lcg_sequence() {
        let mut rng = Lcg::new(42);
        assert_eq!(rng.next_u32(), 42u32.wrapping_mul(1_664_525).wrapping_add(1_013_904_223));
        let mut a = Lcg::new(7);
        let mut b = Lcg::new(7);
        for _ in 0..100 {
            let u = a.next_unit();
            assert!((0.0..1.0).contains(&u));
            assert_eq!(u, b.next_unit());
        }
    }

    #[test]
    fn test_scatter_draws_from_lcg_sequence() {
        let rocks = scatter_obstacles(&mut Lcg::new(42), 1, 10.0, 0.3);

        let mut rng = Lcg::new(42);
        let r = 10.0 * (rng.next_unit() as f32).sqrt();
        let a = rng.next_unit() as f32 * TAU;
        let spin = rng.next_unit() as f32 * 3.0;

        let expected = Vec3::new(a.cos() * r, 0.3, a.sin() * r);
        assert!((rocks[0].position - expected).length() < 1e-5);
        assert!((rocks[0].rotation.x - spin).abs() < 1e-6);
    }

    #[test]
    fn test_scatter_is_seeded() {
        let a = scatter_obstacles(&mut Lcg::new(42), 80, 45.0, 0.3);
        let b = scatter_obstacles(&mut Lcg::new(42), 80, 45.0, 0.3);
        let c = scatter_obstacles(&mut Lcg::new(43), 80, 45.0, 0.3);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a
            .iter()
            .all(|o| Vec3::new(o.position.x, 0.0, o.position.z).length() <= 45.0 + 1e-3));
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        assert!(TrackParams::default().validate().is_ok());

        let params = TrackParams {
            control_points: 2,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = TrackParams {
            road_half_width: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
