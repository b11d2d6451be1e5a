use std::fmt;

use indexmap::IndexMap;
use rand::Rng;

use crate::{
    config::{AnimationConfig, AppearanceConfig, SpawnArea},
    gate::AnimationKind,
    physics::{Kinematics, Regime, Vec2, Viewport},
};

/// Unscaled edge length of an emote image.
pub const BASE_EMOTE_SIZE: f32 = 128.0;
/// Rain starts this far above the top edge.
pub const RAIN_SPAWN_Y: f32 = -100.0;
/// Depth of an edge spawn band as a share of the usable extent.
const EDGE_BAND_SHARE: f32 = 0.2;

/// Monotonic sequence plus a random salt, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId {
    seq: u64,
    salt: u32,
}

impl InstanceId {
    pub fn new(seq: u64, salt: u32) -> Self {
        Self { seq, salt }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "emote-{}-{:08x}", self.seq, self.salt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Visible { retire_at_ms: u64 },
    FadingOut { remove_at_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatMotion {
    pub amplitude: f32,
    pub speed: f32,
}

#[derive(Debug, Clone)]
pub struct EmoteInstance {
    pub id: InstanceId,
    pub name: String,
    pub image_url: String,
    pub spawned_at_ms: u64,
    pub kind: AnimationKind,
    /// Top-left corner of the rendered box.
    pub position: Vec2,
    /// Edge length of the square rendered box.
    pub size: f32,
    pub kinematics: Option<Kinematics>,
    pub float_motion: Option<FloatMotion>,
    pub phase: Phase,
    pub hidden: bool,
}

impl EmoteInstance {
    pub fn is_visible(&self) -> bool {
        matches!(self.phase, Phase::Visible { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub id: InstanceId,
    pub evicted: Option<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct RegistryParams {
    pub ceiling: usize,
    pub display_ms: u64,
    pub fade_in_ms: u64,
    pub fade_out_ms: u64,
    pub appearance: AppearanceConfig,
    pub animation: AnimationConfig,
    pub viewport: Viewport,
}

/// Owns every on-screen instance. Keeps at most `ceiling` of them, evicting
/// the oldest-inserted first, and drives their display and fade deadlines.
#[derive(Debug)]
pub struct LifecycleRegistry {
    params: RegistryParams,
    active: IndexMap<InstanceId, EmoteInstance>,
    /// Evicted instances finishing their fade; not part of the active set
    /// but still moved by physics until removed.
    lingering: Vec<EmoteInstance>,
    next_seq: u64,
}

impl LifecycleRegistry {
    pub fn new(params: RegistryParams) -> Self {
        Self {
            params,
            active: IndexMap::new(),
            lingering: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn ceiling(&self) -> usize {
        self.params.ceiling
    }

    pub fn get(&self, id: InstanceId) -> Option<&EmoteInstance> {
        self.active.get(&id)
    }

    /// Active instances in insertion order.
    pub fn instances(&self) -> impl Iterator<Item = &EmoteInstance> {
        self.active.values()
    }

    pub fn lingering(&self) -> &[EmoteInstance] {
        &self.lingering
    }

    /// Everything still on screen: active instances in insertion order, then
    /// evicted ones that are fading out.
    pub fn on_screen_mut(&mut self) -> impl Iterator<Item = &mut EmoteInstance> {
        self.active.values_mut().chain(self.lingering.iter_mut())
    }

    pub fn admit<R: Rng + ?Sized>(
        &mut self,
        name: &str,
        image_url: &str,
        kind: AnimationKind,
        now_ms: u64,
        rng: &mut R,
    ) -> Admission {
        let evicted = if self.active.len() >= self.params.ceiling {
            self.evict_oldest(now_ms)
        } else {
            None
        };

        let id = InstanceId::new(self.next_seq, rng.gen());
        self.next_seq += 1;

        let size = BASE_EMOTE_SIZE * self.pick_scale(rng);
        let (position, kinematics, float_motion) = self.initial_state(kind, rng);
        let instance = EmoteInstance {
            id,
            name: name.to_owned(),
            image_url: image_url.to_owned(),
            spawned_at_ms: now_ms,
            kind,
            position,
            size,
            kinematics,
            float_motion,
            phase: Phase::Visible {
                retire_at_ms: now_ms.saturating_add(self.params.display_ms),
            },
            hidden: false,
        };
        self.active.insert(id, instance);
        Admission { id, evicted }
    }

    /// Starts the fade-out of `id`. Returns false when the instance is
    /// absent or already fading.
    pub fn retire(&mut self, id: InstanceId, now_ms: u64) -> bool {
        let fade_out_ms = self.params.fade_out_ms;
        match self.active.get_mut(&id) {
            Some(instance) if instance.is_visible() => {
                instance.phase = Phase::FadingOut {
                    remove_at_ms: now_ms.saturating_add(fade_out_ms),
                };
                true
            }
            _ => false,
        }
    }

    /// Fires due display and fade deadlines. Returns the ids that left the
    /// active set.
    pub fn advance(&mut self, now_ms: u64) -> Vec<InstanceId> {
        let due: Vec<InstanceId> = self
            .active
            .values()
            .filter(|instance| {
                matches!(instance.phase, Phase::Visible { retire_at_ms } if retire_at_ms <= now_ms)
            })
            .map(|instance| instance.id)
            .collect();
        for id in due {
            self.retire(id, now_ms);
        }

        let mut removed = Vec::new();
        self.active.retain(|id, instance| match instance.phase {
            Phase::FadingOut { remove_at_ms } if remove_at_ms <= now_ms => {
                removed.push(*id);
                false
            }
            _ => true,
        });
        self.lingering.retain(|instance| {
            !matches!(instance.phase, Phase::FadingOut { remove_at_ms } if remove_at_ms <= now_ms)
        });
        removed
    }

    /// Renderer opacity in `[0, 1]`: ramps up over the fade-in after spawn and
    /// down to zero at the removal deadline.
    pub fn opacity(&self, instance: &EmoteInstance, now_ms: u64) -> f32 {
        if instance.hidden {
            return 0.0;
        }
        let ramp = |elapsed: u64, span: u64| {
            if span == 0 {
                1.0
            } else {
                (elapsed as f32 / span as f32).clamp(0.0, 1.0)
            }
        };
        let fade_in = ramp(
            now_ms.saturating_sub(instance.spawned_at_ms),
            self.params.fade_in_ms,
        );
        match instance.phase {
            Phase::Visible { .. } => fade_in,
            Phase::FadingOut { remove_at_ms } => {
                fade_in.min(ramp(remove_at_ms.saturating_sub(now_ms), self.params.fade_out_ms))
            }
        }
    }

    /// Hides every instance of `name`, e.g. after its image failed to load.
    pub fn hide_by_name(&mut self, name: &str) -> usize {
        let mut hidden = 0;
        for instance in self
            .active
            .values_mut()
            .chain(self.lingering.iter_mut())
            .filter(|instance| instance.name == name && !instance.hidden)
        {
            instance.hidden = true;
            hidden += 1;
        }
        hidden
    }

    fn evict_oldest(&mut self, now_ms: u64) -> Option<InstanceId> {
        let (id, mut instance) = self.active.shift_remove_index(0)?;
        if instance.is_visible() {
            instance.phase = Phase::FadingOut {
                remove_at_ms: now_ms.saturating_add(self.params.fade_out_ms),
            };
        }
        self.lingering.push(instance);
        Some(id)
    }

    fn pick_scale<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let appearance = &self.params.appearance;
        if appearance.random_scale {
            random_between(rng, appearance.min_scale, appearance.max_scale)
        } else {
            appearance.scale
        }
    }

    fn initial_state<R: Rng + ?Sized>(
        &self,
        kind: AnimationKind,
        rng: &mut R,
    ) -> (Vec2, Option<Kinematics>, Option<FloatMotion>) {
        let margin = self.params.appearance.margin;
        let viewport = self.params.viewport;
        match kind {
            AnimationKind::Rain => {
                let rain = &self.params.animation.rain;
                let deviation = random_between(rng, -1.0, 1.0) * rain.angle_deviation;
                let angle = rain.angle + deviation;
                let radians = angle.to_radians();
                let position = Vec2::new(
                    random_between(rng, margin, viewport.width - margin),
                    RAIN_SPAWN_Y,
                );
                let kinematics = Kinematics {
                    velocity: Vec2::new(radians.cos() * rain.speed, radians.sin() * rain.speed),
                    rotation: angle - 90.0,
                    regime: Regime::Falling,
                };
                (position, Some(kinematics), None)
            }
            AnimationKind::Physics => {
                let physics = &self.params.animation.physics;
                let position = random_point(rng, viewport, margin);
                let kinematics = Kinematics {
                    velocity: Vec2::new(
                        (rng.gen::<f32>() - 0.5) * physics.horizontal_jitter,
                        -physics.launch_speed,
                    ),
                    rotation: 0.0,
                    regime: Regime::Bounded,
                };
                (position, Some(kinematics), None)
            }
            AnimationKind::Float => {
                let float = &self.params.animation.float;
                let position = spawn_in_area(
                    rng,
                    self.params.appearance.spawn_area,
                    viewport,
                    margin,
                );
                let motion = FloatMotion {
                    amplitude: float.amplitude,
                    speed: float.speed,
                };
                (position, None, Some(motion))
            }
        }
    }
}

/// Uniform in `[low, high)`; collapses to `low` for empty ranges.
fn random_between<R: Rng + ?Sized>(rng: &mut R, low: f32, high: f32) -> f32 {
    if high > low {
        rng.gen_range(low..high)
    } else {
        low
    }
}

fn random_point<R: Rng + ?Sized>(rng: &mut R, viewport: Viewport, margin: f32) -> Vec2 {
    Vec2::new(
        random_between(rng, margin, viewport.width - margin),
        random_between(rng, margin, viewport.height - margin),
    )
}

fn spawn_in_area<R: Rng + ?Sized>(
    rng: &mut R,
    area: SpawnArea,
    viewport: Viewport,
    margin: f32,
) -> Vec2 {
    let (left, right) = (margin, viewport.width - margin);
    let (top, bottom) = (margin, viewport.height - margin);
    let band_w = (right - left).max(0.0) * EDGE_BAND_SHARE;
    let band_h = (bottom - top).max(0.0) * EDGE_BAND_SHARE;
    match area {
        SpawnArea::Random => random_point(rng, viewport, margin),
        SpawnArea::Top => Vec2::new(
            random_between(rng, left, right),
            random_between(rng, top, top + band_h),
        ),
        SpawnArea::Bottom => Vec2::new(
            random_between(rng, left, right),
            random_between(rng, bottom - band_h, bottom),
        ),
        SpawnArea::Left => Vec2::new(
            random_between(rng, left, left + band_w),
            random_between(rng, top, bottom),
        ),
        SpawnArea::Right => Vec2::new(
            random_between(rng, right - band_w, right),
            random_between(rng, top, bottom),
        ),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{LifecycleRegistry, Phase, RegistryParams, BASE_EMOTE_SIZE, RAIN_SPAWN_Y};
    use crate::{
        config::{AnimationConfig, AppearanceConfig, SpawnArea},
        gate::AnimationKind,
        physics::{Regime, Viewport},
    };

    fn params(ceiling: usize) -> RegistryParams {
        RegistryParams {
            ceiling,
            display_ms: 5_000,
            fade_in_ms: 300,
            fade_out_ms: 300,
            appearance: AppearanceConfig::default(),
            animation: AnimationConfig::default(),
            viewport: Viewport {
                width: 1920.0,
                height: 1080.0,
            },
        }
    }

    #[test]
    fn capacity_never_exceeded_and_oldest_is_evicted() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut registry = LifecycleRegistry::new(params(3));
        let mut ids = Vec::new();
        for (index, name) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            let admission =
                registry.admit(name, "https://img", AnimationKind::Float, index as u64, &mut rng);
            assert!(registry.len() <= 3);
            match index {
                0..=2 => assert_eq!(admission.evicted, None),
                _ => assert_eq!(admission.evicted, Some(ids[index - 3])),
            }
            ids.push(admission.id);
        }
        let names: Vec<&str> = registry.instances().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["c", "d", "e"]);
        assert_eq!(registry.lingering().len(), 2);
    }

    #[test]
    fn eviction_ignores_recent_use_order() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut registry = LifecycleRegistry::new(params(2));
        let first = registry.admit("a", "u", AnimationKind::Float, 0, &mut rng).id;
        registry.admit("b", "u", AnimationKind::Float, 1, &mut rng);
        assert!(registry.get(first).is_some());
        let admission = registry.admit("c", "u", AnimationKind::Float, 2, &mut rng);
        assert_eq!(admission.evicted, Some(first));
        assert!(registry.get(first).is_none());
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let mut registry = LifecycleRegistry::new(params(100));
        let a = registry.admit("a", "u", AnimationKind::Float, 0, &mut rng).id;
        let b = registry.admit("a", "u", AnimationKind::Float, 0, &mut rng).id;
        assert_ne!(a, b);
        assert!(b.seq() > a.seq());
        assert!(a.to_string().starts_with("emote-0-"));
    }

    #[test]
    fn display_deadline_starts_fade_then_removes() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let mut registry = LifecycleRegistry::new(params(10));
        let id = registry.admit("a", "u", AnimationKind::Float, 1_000, &mut rng).id;

        assert!(registry.advance(5_999).is_empty());
        assert!(registry.get(id).expect("still active").is_visible());

        assert!(registry.advance(6_000).is_empty());
        assert_eq!(
            registry.get(id).map(|i| i.phase),
            Some(Phase::FadingOut { remove_at_ms: 6_300 })
        );

        assert_eq!(registry.advance(6_300), vec![id]);
        assert!(registry.is_empty());
    }

    #[test]
    fn retire_is_idempotent() {
        let mut rng = ChaCha8Rng::seed_from_u64(15);
        let mut registry = LifecycleRegistry::new(params(10));
        let id = registry.admit("a", "u", AnimationKind::Float, 0, &mut rng).id;
        assert!(registry.retire(id, 100));
        assert!(!registry.retire(id, 200));
        assert_eq!(
            registry.get(id).map(|i| i.phase),
            Some(Phase::FadingOut { remove_at_ms: 400 })
        );
        assert_eq!(registry.advance(400), vec![id]);
        assert!(!registry.retire(id, 500));
    }

    #[test]
    fn evicted_instance_lingers_only_until_fade_completes() {
        let mut rng = ChaCha8Rng::seed_from_u64(16);
        let mut registry = LifecycleRegistry::new(params(1));
        registry.admit("a", "u", AnimationKind::Float, 0, &mut rng);
        registry.admit("b", "u", AnimationKind::Float, 100, &mut rng);
        assert_eq!(registry.lingering().len(), 1);
        registry.advance(399);
        assert_eq!(registry.lingering().len(), 1);
        registry.advance(400);
        assert!(registry.lingering().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rain_spawns_above_viewport_with_fixed_rotation() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let mut p = params(10);
        p.animation.rain.angle = 60.0;
        p.animation.rain.angle_deviation = 0.0;
        p.animation.rain.speed = 4.0;
        let mut registry = LifecycleRegistry::new(p);
        let id = registry.admit("a", "u", AnimationKind::Rain, 0, &mut rng).id;
        let instance = registry.get(id).expect("instance");
        let kinematics = instance.kinematics.expect("rain has kinematics");
        assert_eq!(kinematics.regime, Regime::Falling);
        assert_eq!(instance.position.y, RAIN_SPAWN_Y);
        assert!(instance.position.x >= 50.0 && instance.position.x < 1870.0);
        assert!((kinematics.rotation + 30.0).abs() < 1e-4);
        assert!((kinematics.velocity.x - 2.0).abs() < 1e-3);
        assert!((kinematics.velocity.y - 3.4641).abs() < 1e-3);
    }

    #[test]
    fn physics_launches_upward_within_margins() {
        let mut rng = ChaCha8Rng::seed_from_u64(18);
        let mut registry = LifecycleRegistry::new(params(10));
        for _ in 0..20 {
            let id = registry.admit("a", "u", AnimationKind::Physics, 0, &mut rng).id;
            let instance = registry.get(id).expect("instance");
            let kinematics = instance.kinematics.expect("physics has kinematics");
            assert_eq!(kinematics.regime, Regime::Bounded);
            assert_eq!(kinematics.velocity.y, -5.0);
            assert!(kinematics.velocity.x.abs() <= 2.5);
            assert!(instance.position.y >= 50.0 && instance.position.y < 1030.0);
        }
    }

    #[test]
    fn float_has_no_kinematics_and_honors_spawn_area() {
        let mut rng = ChaCha8Rng::seed_from_u64(19);
        let mut p = params(100);
        p.appearance.spawn_area = SpawnArea::Bottom;
        let mut registry = LifecycleRegistry::new(p);
        for _ in 0..20 {
            let id = registry.admit("a", "u", AnimationKind::Float, 0, &mut rng).id;
            let instance = registry.get(id).expect("instance");
            assert!(instance.kinematics.is_none());
            assert!(instance.float_motion.is_some());
            // usable height 980, bottom band 196
            assert!(instance.position.y >= 1030.0 - 196.0 - 1e-3);
            assert!(instance.position.y < 1030.0);
        }
    }

    #[test]
    fn size_follows_scale_settings() {
        let mut rng = ChaCha8Rng::seed_from_u64(20);
        let mut p = params(10);
        p.appearance.random_scale = false;
        p.appearance.scale = 0.5;
        let mut registry = LifecycleRegistry::new(p);
        let id = registry.admit("a", "u", AnimationKind::Float, 0, &mut rng).id;
        assert_eq!(registry.get(id).map(|i| i.size), Some(BASE_EMOTE_SIZE * 0.5));
    }

    #[test]
    fn opacity_ramps_in_and_out() {
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let mut registry = LifecycleRegistry::new(params(10));
        let id = registry.admit("a", "u", AnimationKind::Float, 1_000, &mut rng).id;
        let opacity = |registry: &LifecycleRegistry, now| {
            let instance = registry.get(id).expect("instance");
            registry.opacity(instance, now)
        };
        assert_eq!(opacity(&registry, 1_000), 0.0);
        assert!((opacity(&registry, 1_150) - 0.5).abs() < 1e-4);
        assert_eq!(opacity(&registry, 3_000), 1.0);

        registry.retire(id, 4_000);
        assert!((opacity(&registry, 4_150) - 0.5).abs() < 1e-4);
        assert_eq!(opacity(&registry, 4_300), 0.0);

        registry.hide_by_name("a");
        assert_eq!(opacity(&registry, 4_100), 0.0);
    }

    #[test]
    fn hide_by_name_marks_matching_instances() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut registry = LifecycleRegistry::new(params(10));
        registry.admit("bad", "u", AnimationKind::Float, 0, &mut rng);
        registry.admit("good", "u", AnimationKind::Float, 0, &mut rng);
        registry.admit("bad", "u", AnimationKind::Float, 0, &mut rng);
        assert_eq!(registry.hide_by_name("bad"), 2);
        assert_eq!(registry.hide_by_name("bad"), 0);
        assert_eq!(registry.instances().filter(|i| i.hidden).count(), 2);
    }
}
