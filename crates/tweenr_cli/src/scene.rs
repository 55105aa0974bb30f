//! Scene file handling
//!
//! A scene describes one target object and the steps of the timeline that
//! animates it:
//!
//! ```toml
//! tick_rate_hz = 30
//!
//! [target]
//! x = 0
//! alpha = 1
//!
//! [[steps]]
//! kind = "to"
//! props = { x = 100, alpha = 0 }
//! duration_ms = 500
//! easing = "bounceOut"
//!
//! [[steps]]
//! kind = "wait"
//! duration_ms = 250
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tweenr_animation::{Easing, Goal, PropertyBag, PropertyMap, SchedulerHandle, Timeline};

/// Top-level scene (`*.toml`)
#[derive(Debug, Deserialize, Serialize)]
pub struct Scene {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: f32,
    /// Initial property values of the animated object
    #[serde(default)]
    pub target: BTreeMap<String, f32>,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

fn default_tick_rate() -> f32 {
    30.0
}

/// One queued timeline step
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepConfig {
    To {
        props: BTreeMap<String, f32>,
        #[serde(default)]
        duration_ms: f32,
        /// Name from the easing registry, linear when absent
        #[serde(default)]
        easing: Option<String>,
    },
    Wait {
        duration_ms: f32,
    },
    Call {
        #[serde(default)]
        duration_ms: f32,
        #[serde(default = "default_label")]
        label: String,
    },
    Loop,
}

fn default_label() -> String {
    "call".to_string()
}

/// A scene bound to a scheduler
pub struct Playback {
    pub target: Rc<RefCell<PropertyBag>>,
    pub timeline: Timeline<PropertyBag>,
    /// Labels of call steps, in the order they fired
    pub calls: Rc<RefCell<Vec<String>>>,
    names: Vec<String>,
}

impl Playback {
    /// Current values of every target property, in name order
    pub fn sample(&self) -> Vec<(String, f32)> {
        let target = self.target.borrow();
        self.names
            .iter()
            .filter_map(|name| target.get(name).map(|value| (name.clone(), value)))
            .collect()
    }
}

impl Scene {
    /// Load a scene from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            anyhow::bail!("No scene file found at {}", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let scene: Scene = toml::from_str(content)?;
        if scene.steps.is_empty() {
            anyhow::bail!("Scene has no steps");
        }
        Ok(scene)
    }

    /// Display name, falling back to a placeholder
    pub fn title(&self) -> &str {
        self.name.as_deref().unwrap_or("untitled")
    }

    /// Build the target and queue every step on a new timeline
    pub fn instantiate(&self, scheduler: &SchedulerHandle) -> Result<Playback> {
        let target: PropertyBag = self
            .target
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect();
        let target = Rc::new(RefCell::new(target));
        let calls = Rc::new(RefCell::new(Vec::new()));
        let timeline = Timeline::new(scheduler, target.clone())?;

        for (index, step) in self.steps.iter().enumerate() {
            match step {
                StepConfig::To {
                    props,
                    duration_ms,
                    easing,
                } => {
                    let easing = easing
                        .as_deref()
                        .map(str::parse::<Easing>)
                        .transpose()
                        .with_context(|| format!("Step {index}"))?;
                    let props: PropertyMap =
                        props.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    timeline
                        .to(props, *duration_ms, easing)
                        .with_context(|| format!("Step {index}"))?;
                }
                StepConfig::Wait { duration_ms } => {
                    timeline
                        .wait(*duration_ms)
                        .with_context(|| format!("Step {index}"))?;
                }
                StepConfig::Call { duration_ms, label } => {
                    let calls = calls.clone();
                    let label = label.clone();
                    let goal = Goal::call(move || {
                        tracing::info!("Scene: call step '{}'", label);
                        calls.borrow_mut().push(label.clone());
                    });
                    timeline
                        .to(goal, *duration_ms, None)
                        .with_context(|| format!("Step {index}"))?;
                }
                StepConfig::Loop => {
                    timeline.loop_forever()?;
                }
            }
        }

        tracing::debug!(
            "Scene: '{}' queued {} steps, {} ms total",
            self.title(),
            timeline.step_count(),
            timeline.total_duration_ms()
        );

        Ok(Playback {
            target,
            timeline,
            calls,
            names: self.target.keys().cloned().collect(),
        })
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize scene")
    }
}
