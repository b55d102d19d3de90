use thiserror::Error;
use trove_core::TroveConfig;
use trove_core::request::RequestKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("no dispatcher workers configured")]
    NoWorkers,
    #[error("dispatcher queue capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("extraction needs at least one permit slot")]
    ZeroPermits,
    #[error("explore concurrency must be at least 1")]
    ZeroExploreConcurrency,
    #[error("field {x}x{y} has no cells")]
    EmptyField { x: u32, y: u32 },
    #[error("shape table is empty")]
    EmptyShapeTable,
    #[error("shape {index} ({height}x{width}) has a zero dimension")]
    DegenerateShape {
        index: usize,
        height: u32,
        width: u32,
    },
    #[error("shape table must end in a 1x1 cell, found {height}x{width}")]
    ShapeTableNotTerminated { height: u32, width: u32 },
    #[error("cost limit of zero would block every request")]
    ZeroCostLimit,
    #[error("maximum dig depth must be at least 1")]
    ZeroDigDepth,
    #[error("no worker serves {}; raise dispatcher.workers", kind_list(.kinds))]
    UnservedKinds { kinds: Vec<RequestKind> },
}

fn kind_list(kinds: &[RequestKind]) -> String {
    kinds
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

/// Reject configurations the agent cannot run with and collect warnings
/// for ones that run poorly.
pub fn apply_guard_rails(
    config: &TroveConfig,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    let dispatcher = &config.dispatcher;
    let dedicated: usize = dispatcher.dedicated_workers.values().sum();
    if dispatcher.workers == 0 && dedicated == 0 {
        return Err(ConfigGuardRailError::NoWorkers);
    }
    if dispatcher.queue_capacity == 0 {
        return Err(ConfigGuardRailError::ZeroQueueCapacity);
    }
    if dispatcher.max_cost_per_second == Some(0) {
        return Err(ConfigGuardRailError::ZeroCostLimit);
    }
    if dispatcher.workers == 0 {
        let unserved: Vec<RequestKind> = RequestKind::ALL
            .into_iter()
            .filter(|kind| dispatcher.dedicated_for(*kind) == 0)
            .collect();
        if !unserved.is_empty() {
            return Err(ConfigGuardRailError::UnservedKinds { kinds: unserved });
        }
    }

    let search = &config.search;
    if search.field_size_x == 0 || search.field_size_y == 0 {
        return Err(ConfigGuardRailError::EmptyField {
            x: search.field_size_x,
            y: search.field_size_y,
        });
    }
    if search.explore_concurrency == 0 {
        return Err(ConfigGuardRailError::ZeroExploreConcurrency);
    }
    if let Some((index, shape)) = search
        .shapes
        .iter()
        .enumerate()
        .find(|(_, shape)| shape.height == 0 || shape.width == 0)
    {
        return Err(ConfigGuardRailError::DegenerateShape {
            index,
            height: shape.height,
            width: shape.width,
        });
    }
    match search.shapes.last() {
        None => return Err(ConfigGuardRailError::EmptyShapeTable),
        Some(last) if !last.is_unit() => {
            return Err(ConfigGuardRailError::ShapeTableNotTerminated {
                height: last.height,
                width: last.width,
            });
        }
        Some(_) => {}
    }
    let growing = search.shapes.windows(2).any(|pair| {
        u64::from(pair[1].height) * u64::from(pair[1].width)
            > u64::from(pair[0].height) * u64::from(pair[0].width)
    });
    if growing {
        warnings.push_with_hint(
            "shape table grows between depths",
            "Deeper shapes are expected to cover fewer cells than shallower ones",
        );
    }
    if search.assumed_treasures == 0 {
        warnings.push("assumed treasure total is zero; the run will end immediately");
    }

    let extraction = &config.extraction;
    if extraction.max_permits == 0 {
        return Err(ConfigGuardRailError::ZeroPermits);
    }
    if extraction.max_dig_depth == 0 {
        return Err(ConfigGuardRailError::ZeroDigDepth);
    }
    if extraction.min_depth_to_convert > extraction.max_dig_depth {
        warnings.push_with_hint(
            format!(
                "min_depth_to_convert ({}) is deeper than max_dig_depth ({}); nothing will be cashed",
                extraction.min_depth_to_convert, extraction.max_dig_depth
            ),
            "Lower extraction.min_depth_to_convert",
        );
    }

    if config.telemetry.stats_interval().is_none() {
        warnings.push("periodic stats reporting is disabled");
    }

    Ok(warnings)
}
