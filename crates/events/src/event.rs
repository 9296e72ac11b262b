/// A domain-agnostic event.
///
/// Events are immutable facts, appended in order to an aggregate's log and
/// published once persisted.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "deployment.target.state_changed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32 {
        1
    }
}
