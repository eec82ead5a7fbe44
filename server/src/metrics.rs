//! Server core metrics.

use metriken::{Counter, Gauge, metric};

#[metric(
    name = "rpc_calls_accepted",
    description = "Total calls accepted across all method slots"
)]
pub static CALLS_ACCEPTED: Counter = Counter::new();

#[metric(
    name = "rpc_events_dispatched",
    description = "Total completion-queue events dispatched"
)]
pub static EVENTS_DISPATCHED: Counter = Counter::new();

#[metric(
    name = "rpc_stale_tags",
    description = "Events whose tag no longer addressed a live state object"
)]
pub static STALE_TAGS: Counter = Counter::new();

#[metric(
    name = "rpc_calldata_active",
    description = "Live per-call state objects, armed slots included"
)]
pub static CALLDATA_ACTIVE: Gauge = Gauge::new();

#[metric(
    name = "rpc_unknown_methods",
    description = "Calls rejected with UNIMPLEMENTED by the unknown-method responder"
)]
pub static UNKNOWN_METHODS: Counter = Counter::new();

#[metric(name = "fan_publishes", description = "Total payloads published to the fan")]
pub static FAN_PUBLISHES: Counter = Counter::new();

#[metric(
    name = "fan_subscribers",
    description = "Subscribers currently parked in the fan"
)]
pub static FAN_SUBSCRIBERS: Gauge = Gauge::new();
