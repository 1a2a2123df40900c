//! Route units
//!
//! A route unit registers handlers on the application while routes are
//! being loaded. Units run once each, ordered by name.

use crate::Epic;

pub trait RouteUnit: Send + Sync {
    /// Unique name; also the load order key.
    fn name(&self) -> &str;

    /// Register this unit's handlers.
    fn register(&self, epic: &mut Epic);
}

/// A route unit built from a name and a closure.
pub struct FnRouteUnit<F> {
    name: String,
    register: F,
}

impl<F> FnRouteUnit<F>
where
    F: Fn(&mut Epic) + Send + Sync,
{
    pub fn new(name: impl Into<String>, register: F) -> Self {
        Self {
            name: name.into(),
            register,
        }
    }
}

impl<F> RouteUnit for FnRouteUnit<F>
where
    F: Fn(&mut Epic) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, epic: &mut Epic) {
        (self.register)(epic)
    }
}

/// Shorthand for [`FnRouteUnit::new`].
pub fn route_unit<F>(name: impl Into<String>, register: F) -> FnRouteUnit<F>
where
    F: Fn(&mut Epic) + Send + Sync,
{
    FnRouteUnit::new(name, register)
}

/// Sort units into load order. Equal names keep registration order.
pub(crate) fn load_order(units: &mut [Box<dyn RouteUnit>]) {
    units.sort_by(|a, b| a.name().cmp(b.name()));
}
