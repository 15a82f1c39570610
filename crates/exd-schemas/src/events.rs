//! Journal event vocabulary.

use serde::{Deserialize, Serialize};

/// Every event type the journal records. The integer codes are the stable
/// on-disk encoding; renumbering would corrupt existing journals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    OrderCreated,
    OrderValidated,
    OrderRejected,
    OrderSubmitted,
    OrderAccepted,
    OrderCancelled,
    OrderReplaced,
    OrderExpired,

    KillSwitchActivated,

    SystemStarted,
    SystemStopped,
    GatewayConnected,
    GatewayDisconnected,
    ErrorOccurred,

    SignalReceived,
    SignalProcessed,
    SignalIgnored,

    OrderFilled,
    OrderPartiallyFilled,
}

impl Event {
    pub fn code(self) -> i64 {
        match self {
            Event::OrderCreated => 0,
            Event::OrderValidated => 1,
            Event::OrderRejected => 2,
            Event::OrderSubmitted => 3,
            Event::OrderAccepted => 4,
            Event::OrderCancelled => 5,
            Event::OrderReplaced => 6,
            Event::OrderExpired => 7,
            Event::KillSwitchActivated => 8,
            Event::SystemStarted => 9,
            Event::SystemStopped => 10,
            Event::GatewayConnected => 11,
            Event::GatewayDisconnected => 12,
            Event::ErrorOccurred => 13,
            Event::SignalReceived => 14,
            Event::SignalProcessed => 15,
            Event::SignalIgnored => 16,
            Event::OrderFilled => 17,
            Event::OrderPartiallyFilled => 18,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Event::OrderCreated,
            1 => Event::OrderValidated,
            2 => Event::OrderRejected,
            3 => Event::OrderSubmitted,
            4 => Event::OrderAccepted,
            5 => Event::OrderCancelled,
            6 => Event::OrderReplaced,
            7 => Event::OrderExpired,
            8 => Event::KillSwitchActivated,
            9 => Event::SystemStarted,
            10 => Event::SystemStopped,
            11 => Event::GatewayConnected,
            12 => Event::GatewayDisconnected,
            13 => Event::ErrorOccurred,
            14 => Event::SignalReceived,
            15 => Event::SignalProcessed,
            16 => Event::SignalIgnored,
            17 => Event::OrderFilled,
            18 => Event::OrderPartiallyFilled,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Event::OrderCreated => "ORDER_CREATED",
            Event::OrderValidated => "ORDER_VALIDATED",
            Event::OrderRejected => "ORDER_REJECTED",
            Event::OrderSubmitted => "ORDER_SUBMITTED",
            Event::OrderAccepted => "ORDER_ACCEPTED",
            Event::OrderCancelled => "ORDER_CANCELLED",
            Event::OrderReplaced => "ORDER_REPLACED",
            Event::OrderExpired => "ORDER_EXPIRED",
            Event::KillSwitchActivated => "KILL_SWITCH_ACTIVATED",
            Event::SystemStarted => "SYSTEM_STARTED",
            Event::SystemStopped => "SYSTEM_STOPPED",
            Event::GatewayConnected => "GATEWAY_CONNECTED",
            Event::GatewayDisconnected => "GATEWAY_DISCONNECTED",
            Event::ErrorOccurred => "ERROR_OCCURRED",
            Event::SignalReceived => "SIGNAL_RECEIVED",
            Event::SignalProcessed => "SIGNAL_PROCESSED",
            Event::SignalIgnored => "SIGNAL_IGNORED",
            Event::OrderFilled => "ORDER_FILLED",
            Event::OrderPartiallyFilled => "ORDER_PARTIALLY_FILLED",
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
