use std::net::SocketAddr;

use crate::command::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "rentcal_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "rentcal_command_duration_seconds";

// ── Booking domain ──────────────────────────────────────────────

/// Counter: reservations persisted as PENDING.
pub const RESERVATIONS_CREATED_TOTAL: &str = "rentcal_reservations_created_total";

/// Counter: bookings and reschedules refused by the resolver. Labels: reason.
pub const BOOKING_CONFLICTS_TOTAL: &str = "rentcal_booking_conflicts_total";

/// Histogram: end-to-end create_reservation latency in seconds.
pub const BOOKING_DURATION_SECONDS: &str = "rentcal_booking_duration_seconds";

/// Counter: applied status changes. Labels: to.
pub const STATUS_TRANSITIONS_TOTAL: &str = "rentcal_status_transitions_total";

/// Counter: admin blocked ranges created.
pub const BLOCKED_RANGES_CREATED_TOTAL: &str = "rentcal_blocked_ranges_created_total";

/// Counter: notifier deliveries that failed (logged and dropped).
pub const NOTIFY_FAILURES_TOTAL: &str = "rentcal_notify_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "rentcal_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "rentcal_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "rentcal_connections_rejected_total";

/// Counter: failed `auth` handshakes.
pub const AUTH_FAILURES_TOTAL: &str = "rentcal_auth_failures_total";

/// Gauge: properties with an event channel.
pub const LISTEN_CHANNELS: &str = "rentcal_listen_channels";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rentcal_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rentcal_wal_flush_batch_size";

/// Counter: journal compactions.
pub const COMPACTIONS_TOTAL: &str = "rentcal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Auth { .. } => "auth",
        Command::CheckAvailability { .. } => "check_availability",
        Command::UnavailableDays { .. } => "unavailable_days",
        Command::CreateReservation { .. } => "create_reservation",
        Command::SetReservationStatus { .. } => "set_reservation_status",
        Command::RescheduleReservation { .. } => "reschedule_reservation",
        Command::GetReservation { .. } => "get_reservation",
        Command::ListReservations { .. } => "list_reservations",
        Command::ListPropertyReservations { .. } => "list_property_reservations",
        Command::ListUserReservations { .. } => "list_user_reservations",
        Command::CreateBlockedRange { .. } => "create_blocked_range",
        Command::UpdateBlockedRange { .. } => "update_blocked_range",
        Command::DeleteBlockedRange { .. } => "delete_blocked_range",
        Command::ListBlockedRanges { .. } => "list_blocked_ranges",
        Command::ListBlockedInRange { .. } => "list_blocked_in_range",
        Command::IsBlocked { .. } => "is_blocked",
        Command::PutProperty { .. } => "put_property",
        Command::PutUser { .. } => "put_user",
        Command::Listen { .. } => "listen",
        Command::Unlisten { .. } => "unlisten",
        Command::UnlistenAll => "unlisten_all",
        Command::Compact => "compact",
    }
}
