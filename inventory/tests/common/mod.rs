//! Shared setup for the inventory integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use boxoffice_inventory::{
    ConflictPolicy, EventId, Identity, InventoryConfig, InventoryService, Role, SessionContext,
    SessionId, TicketTypeId,
    config::AccessConfig,
    ledger::InMemoryTransactionSink,
    service::RegisterTicketTypeRequest,
};
use boxoffice_testing::{ManualClock, init_test_tracing};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

/// Service wired to a manual clock and an in-memory ledger.
pub struct Harness {
    pub service: InventoryService,
    pub clock: ManualClock,
    pub sink: InMemoryTransactionSink,
}

pub fn harness() -> Harness {
    harness_with(InventoryConfig::default())
}

pub fn harness_with_policy(policy: ConflictPolicy) -> Harness {
    harness_with(InventoryConfig {
        conflict_policy: policy,
        ..InventoryConfig::default()
    })
}

pub fn harness_with(config: InventoryConfig) -> Harness {
    init_test_tracing();
    let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap());
    let sink = InMemoryTransactionSink::new();
    let access = AccessConfig {
        admin_emails: vec!["ops@example.com".to_string()],
        api_tokens: vec![],
    };
    let service = InventoryService::build(
        Arc::new(clock.clone()),
        Arc::new(sink.clone()),
        config,
        &access,
    );
    Harness {
        service,
        clock,
        sink,
    }
}

pub fn admin() -> SessionContext {
    SessionContext::new(Identity::new("ops", "ops@example.com", vec![]), None)
}

pub fn buyer(session: &str) -> SessionContext {
    SessionContext::new(
        Identity::new(session, format!("{session}@example.com"), vec![Role::Customer]),
        Some(SessionId::new(session)),
    )
}

impl Harness {
    /// Register one ticket type with `total` units.
    pub async fn seed(&self, total: u32) -> (EventId, TicketTypeId) {
        let event_id = EventId::new();
        let update = self
            .service
            .register_ticket_type(
                &admin(),
                event_id,
                RegisterTicketTypeRequest {
                    ticket_type_id: None,
                    name: "General Admission".to_string(),
                    total,
                },
            )
            .await
            .unwrap();
        let ticket_type_id = update.updated_inventory.unwrap().ticket_type_id;
        (event_id, ticket_type_id)
    }

    /// Stored counters `(total, sold, held)`, without lazy expiry applied.
    pub async fn stored(&self, event_id: EventId, ticket_type_id: TicketTypeId) -> (u32, u32, u32) {
        self.service
            .store()
            .state(|state| {
                let record = state.record(event_id, ticket_type_id).unwrap();
                (record.total, record.sold, record.held)
            })
            .await
    }

    pub async fn available(&self, event_id: EventId, ticket_type_id: TicketTypeId) -> u32 {
        self.service
            .get_status(&admin(), event_id)
            .await
            .unwrap()
            .ticket_types
            .into_iter()
            .find(|view| view.ticket_type_id == ticket_type_id)
            .unwrap()
            .available
    }

    pub async fn consistent(&self) -> bool {
        self.service.store().state(|state| state.is_consistent()).await
    }
}
