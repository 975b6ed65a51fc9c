// PostgreSQL storage
// Decision: runtime-checked queries (query_as + FromRow) so the crate builds
// without a live database.
//
// Atomic units:
// - scheduling: transaction + pg_advisory_xact_lock keyed by structure
// - admission: transaction + SELECT ... FOR UPDATE on the zone row, then a
//   count of VALID/USED tickets before inserting
// - validation: a single conditional UPDATE ... WHERE status = 'VALID'

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, PgConnection};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{
    Area, AudienceZoneTemplate, Event, EventAudienceZone, EventStatus, ParticipantSnapshot,
    Reservation, ReserveOutcome, SeatingType, TemplateRef, Ticket, TicketStatus, ZoneFill,
};
use crate::services::{ledger, scheduler};
use crate::utils::AppError;

const EVENT_COLUMNS: &str = "id, structure_id, name, start_time, end_time, status, deleted, \
     category_ids, created_by, created_at, updated_at";

const ZONE_COLUMNS: &str = "id, event_id, template_id, area_id, name, allocated_capacity, active";

const TICKET_COLUMNS: &str = "id, reservation_id, event_id, audience_zone_id, user_id, \
     participant_first_name, participant_last_name, participant_email, redemption_code, \
     status, issued_at, validated_at";

const RESERVATION_COLUMNS: &str = "id, user_id, reserved_at, total_amount, idempotency_key";

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    structure_id: Uuid,
    name: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    status: String,
    deleted: bool,
    category_ids: Vec<Uuid>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ZoneRow {
    id: Uuid,
    event_id: Uuid,
    template_id: Uuid,
    area_id: Uuid,
    name: String,
    allocated_capacity: i32,
    active: bool,
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: Uuid,
    area_id: Uuid,
    name: String,
    max_capacity: i32,
    seating_type: String,
    active: bool,
    structure_id: Uuid,
    area_name: String,
}

#[derive(Debug, FromRow)]
struct TicketRow {
    id: Uuid,
    reservation_id: Uuid,
    event_id: Uuid,
    audience_zone_id: Uuid,
    user_id: Uuid,
    participant_first_name: String,
    participant_last_name: String,
    participant_email: String,
    redemption_code: String,
    status: String,
    issued_at: DateTime<Utc>,
    validated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: Uuid,
    user_id: Uuid,
    reserved_at: DateTime<Utc>,
    total_amount: Decimal,
    idempotency_key: Option<String>,
}

#[derive(Debug, FromRow)]
struct FillRow {
    audience_zone_id: Uuid,
    issued: i64,
}

fn parse<T>(raw: &str) -> Result<T, AppError>
where
    T: FromStr<Err = String>,
{
    raw.parse().map_err(AppError::InternalServerError)
}

fn to_u32(value: i64, column: &str) -> Result<u32, AppError> {
    u32::try_from(value)
        .map_err(|_| AppError::InternalServerError(format!("{} out of range: {}", column, value)))
}

fn to_i32(value: u32, column: &str) -> Result<i32, AppError> {
    i32::try_from(value)
        .map_err(|_| AppError::ValidationError(format!("{} is too large: {}", column, value)))
}

/// Advisory lock key for a structure: the high 64 bits of its id.
fn advisory_key(structure_id: Uuid) -> i64 {
    (structure_id.as_u128() >> 64) as i64
}

impl TryFrom<ZoneRow> for EventAudienceZone {
    type Error = AppError;

    fn try_from(row: ZoneRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            event_id: row.event_id,
            template_id: row.template_id,
            area_id: row.area_id,
            name: row.name,
            allocated_capacity: to_u32(row.allocated_capacity.into(), "allocated_capacity")?,
            active: row.active,
        })
    }
}

impl TryFrom<TicketRow> for Ticket {
    type Error = AppError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            reservation_id: row.reservation_id,
            event_id: row.event_id,
            audience_zone_id: row.audience_zone_id,
            user_id: row.user_id,
            participant: ParticipantSnapshot {
                first_name: row.participant_first_name,
                last_name: row.participant_last_name,
                email: row.participant_email,
            },
            redemption_code: row.redemption_code,
            status: parse(&row.status)?,
            issued_at: row.issued_at,
            validated_at: row.validated_at,
        })
    }
}

impl TryFrom<TemplateRow> for TemplateRef {
    type Error = AppError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            template: AudienceZoneTemplate {
                id: row.id,
                area_id: row.area_id,
                name: row.name,
                max_capacity: to_u32(row.max_capacity.into(), "max_capacity")?,
                seating_type: parse::<SeatingType>(&row.seating_type)?,
                active: row.active,
            },
            area: Area {
                id: row.area_id,
                structure_id: row.structure_id,
                name: row.area_name,
            },
        })
    }
}

fn tickets_from_rows(rows: Vec<TicketRow>) -> Result<Vec<Ticket>, AppError> {
    rows.into_iter().map(Ticket::try_from).collect()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::InternalServerError(format!("Migration failed: {}", e)))
    }

    // ============================================
    // Venue topology
    // ============================================

    pub async fn upsert_area(&self, area: Area) -> Result<Area, AppError> {
        let row = sqlx::query_as::<_, Area>(
            r#"
            INSERT INTO areas (id, structure_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET structure_id = EXCLUDED.structure_id, name = EXCLUDED.name
            RETURNING id, structure_id, name
            "#,
        )
        .bind(area.id)
        .bind(area.structure_id)
        .bind(&area.name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn upsert_template(
        &self,
        template: AudienceZoneTemplate,
    ) -> Result<AudienceZoneTemplate, AppError> {
        let area_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM areas WHERE id = $1)")
                .bind(template.area_id)
                .fetch_one(&self.pool)
                .await?;
        if !area_exists {
            return Err(AppError::NotFound(format!(
                "Area {} not found",
                template.area_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO audience_zone_templates (id, area_id, name, max_capacity, seating_type, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                area_id = EXCLUDED.area_id,
                name = EXCLUDED.name,
                max_capacity = EXCLUDED.max_capacity,
                seating_type = EXCLUDED.seating_type,
                active = EXCLUDED.active
            "#,
        )
        .bind(template.id)
        .bind(template.area_id)
        .bind(&template.name)
        .bind(to_i32(template.max_capacity, "max_capacity")?)
        .bind(template.seating_type.as_str())
        .bind(template.active)
        .execute(&self.pool)
        .await?;
        Ok(template)
    }

    pub async fn get_template(&self, template_id: Uuid) -> Result<Option<TemplateRef>, AppError> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT t.id, t.area_id, t.name, t.max_capacity, t.seating_type, t.active,
                   a.structure_id, a.name AS area_name
            FROM audience_zone_templates t
            JOIN areas a ON a.id = t.area_id
            WHERE t.id = $1
            "#,
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TemplateRef::try_from).transpose()
    }

    // ============================================
    // Events
    // ============================================

    #[instrument(skip(self, plan))]
    pub async fn schedule_event<F>(
        &self,
        structure_id: Uuid,
        event_id: Option<Uuid>,
        plan: F,
    ) -> Result<Event, AppError>
    where
        F: FnOnce(Option<Event>) -> Result<Event, AppError> + Send,
    {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_key(structure_id))
            .execute(&mut *tx)
            .await?;

        let existing = match event_id {
            Some(id) => Some(
                load_event(&mut tx, id, true)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?,
            ),
            None => None,
        };

        let event = plan(existing)?;

        let neighbours =
            load_overlapping_events(&mut tx, event.structure_id, event.start_time, event.end_time)
                .await?;
        let conflicts = scheduler::find_conflicts(&event, &neighbours);
        if !conflicts.is_empty() {
            debug!(conflicts = conflicts.len(), "Rejecting overlapping event");
            return Err(AppError::Conflict { conflicts });
        }

        let category_ids: Vec<Uuid> = event.category_ids.iter().copied().collect();
        sqlx::query(
            r#"
            INSERT INTO events (id, structure_id, name, start_time, end_time, status, deleted,
                                category_ids, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time,
                status = EXCLUDED.status,
                category_ids = EXCLUDED.category_ids,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(event.id)
        .bind(event.structure_id)
        .bind(&event.name)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.status.as_str())
        .bind(event.deleted)
        .bind(&category_ids)
        .bind(event.created_by)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&mut *tx)
        .await?;

        let zone_ids: Vec<Uuid> = event.zones.iter().map(|zone| zone.id).collect();
        sqlx::query("DELETE FROM event_audience_zones WHERE event_id = $1 AND NOT (id = ANY($2))")
            .bind(event.id)
            .bind(&zone_ids)
            .execute(&mut *tx)
            .await?;

        for (position, zone) in event.zones.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO event_audience_zones
                    (id, event_id, template_id, area_id, name, allocated_capacity, active, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    allocated_capacity = EXCLUDED.allocated_capacity,
                    active = EXCLUDED.active,
                    position = EXCLUDED.position
                "#,
            )
            .bind(zone.id)
            .bind(zone.event_id)
            .bind(zone.template_id)
            .bind(zone.area_id)
            .bind(&zone.name)
            .bind(to_i32(zone.allocated_capacity, "allocated_capacity")?)
            .bind(zone.active)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(event)
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>, AppError> {
        let mut conn = self.pool.acquire().await?;
        load_event(&mut conn, event_id, false).await
    }

    #[instrument(skip(self))]
    pub async fn transition_event_status(
        &self,
        event_id: Uuid,
        from: EventStatus,
        to: EventStatus,
        at: DateTime<Utc>,
    ) -> Result<Event, AppError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE events SET status = $3, updated_at = $4 \
             WHERE id = $1 AND status = $2 AND NOT deleted",
        )
        .bind(event_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(self.missing_or_raced(event_id).await?);
        }
        let event = load_event(&mut tx, event_id, false)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
        tx.commit().await?;
        Ok(event)
    }

    #[instrument(skip(self))]
    pub async fn soft_delete_draft_event(
        &self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            "UPDATE events SET deleted = TRUE, updated_at = $2 \
             WHERE id = $1 AND status = 'DRAFT' AND NOT deleted",
        )
        .bind(event_id)
        .bind(at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(self.missing_or_raced(event_id).await?);
        }
        Ok(())
    }

    /// Error for a compare-and-set on an event that matched no row.
    async fn missing_or_raced(&self, event_id: Uuid) -> Result<AppError, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM events WHERE id = $1 AND NOT deleted)")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(if exists {
            AppError::TransientConflict(format!("Event {} changed concurrently", event_id))
        } else {
            AppError::NotFound(format!("Event {} not found", event_id))
        })
    }

    // ============================================
    // Capacity and reservations
    // ============================================

    #[instrument(skip(self, pending), fields(reservation_id = %pending.id, seats = pending.tickets.len()))]
    pub async fn reserve(
        &self,
        pending: Reservation,
        event_id: Uuid,
        zone_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let zone = sqlx::query_as::<_, ZoneRow>(&format!(
            "SELECT {} FROM event_audience_zones WHERE id = $1 FOR UPDATE",
            ZONE_COLUMNS
        ))
        .bind(zone_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Audience zone {} not found", zone_id)))?;

        // Checked under the zone lock so a committed duplicate is replayed, not
        // counted against capacity. Other zones fall back to the unique index.
        if let Some(key) = &pending.idempotency_key {
            let existing = sqlx::query_as::<_, ReservationRow>(&format!(
                "SELECT {} FROM reservations WHERE user_id = $1 AND idempotency_key = $2",
                RESERVATION_COLUMNS
            ))
            .bind(pending.user_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = existing {
                let reservation = attach_tickets(&mut tx, row).await?;
                return Ok(ReserveOutcome::Replayed(reservation));
            }
        }

        let event = load_event(&mut tx, event_id, false)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
        ledger::check_bookable(&event, zone_id, now)?;

        let issued: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets \
             WHERE audience_zone_id = $1 AND status = ANY($2)",
        )
        .bind(zone_id)
        .bind(TicketStatus::capacity_holding())
        .fetch_one(&mut *tx)
        .await?;
        ledger::admit(
            zone_id,
            to_u32(zone.allocated_capacity.into(), "allocated_capacity")?,
            to_u32(issued, "issued")?,
            pending.ticket_count(),
        )?;

        sqlx::query(
            "INSERT INTO reservations (id, user_id, reserved_at, total_amount, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(pending.id)
        .bind(pending.user_id)
        .bind(pending.reserved_at)
        .bind(pending.total_amount)
        .bind(&pending.idempotency_key)
        .execute(&mut *tx)
        .await?;

        for (position, ticket) in pending.tickets.iter().enumerate() {
            sqlx::query(&format!(
                "INSERT INTO tickets ({}, position) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                TICKET_COLUMNS
            ))
            .bind(ticket.id)
            .bind(ticket.reservation_id)
            .bind(ticket.event_id)
            .bind(ticket.audience_zone_id)
            .bind(ticket.user_id)
            .bind(&ticket.participant.first_name)
            .bind(&ticket.participant.last_name)
            .bind(&ticket.participant.email)
            .bind(&ticket.redemption_code)
            .bind(ticket.status.as_str())
            .bind(ticket.issued_at)
            .bind(ticket.validated_at)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(ReserveOutcome::Created(pending))
    }

    pub async fn zone_fills(&self, event: &Event) -> Result<Vec<ZoneFill>, AppError> {
        let rows = sqlx::query_as::<_, FillRow>(
            "SELECT audience_zone_id, COUNT(*) AS issued FROM tickets \
             WHERE event_id = $1 AND status = ANY($2) \
             GROUP BY audience_zone_id",
        )
        .bind(event.id)
        .bind(TicketStatus::capacity_holding())
        .fetch_all(&self.pool)
        .await?;

        let mut issued = HashMap::with_capacity(rows.len());
        for row in rows {
            issued.insert(row.audience_zone_id, to_u32(row.issued, "issued")?);
        }
        Ok(event
            .zones
            .iter()
            .map(|zone| ledger::fill(zone, issued.get(&zone.id).copied().unwrap_or(0)))
            .collect())
    }

    pub async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<Reservation>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&mut *conn)
        .await?;
        match row {
            Some(row) => Ok(Some(attach_tickets(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    pub async fn reservations_for_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, AppError> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE user_id = $1 ORDER BY reserved_at DESC, id",
            RESERVATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let ticket_rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE reservation_id = ANY($1) ORDER BY reservation_id, position",
            TICKET_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_reservation: HashMap<Uuid, Vec<Ticket>> = HashMap::new();
        for ticket in tickets_from_rows(ticket_rows)? {
            by_reservation
                .entry(ticket.reservation_id)
                .or_default()
                .push(ticket);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let tickets = by_reservation.remove(&row.id).unwrap_or_default();
                reservation_from_row(row, tickets)
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn cancel_reservation(
        &self,
        reservation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Reservation, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reservation {} not found", reservation_id)))?;

        // Same lock order as admission: zone row first, then its tickets.
        sqlx::query(
            "SELECT z.id FROM event_audience_zones z \
             WHERE z.id = (SELECT audience_zone_id FROM tickets WHERE reservation_id = $1 LIMIT 1) \
             FOR UPDATE",
        )
        .bind(reservation_id)
        .execute(&mut *tx)
        .await?;

        let ticket_rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE reservation_id = $1 ORDER BY position FOR UPDATE",
            TICKET_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_all(&mut *tx)
        .await?;
        let mut tickets = tickets_from_rows(ticket_rows)?;

        if let Some(blocked) = tickets
            .iter()
            .find(|ticket| ticket.status != TicketStatus::Valid)
        {
            return Err(AppError::StateConflict {
                ticket_id: blocked.id,
                status: blocked.status,
                validated_at: blocked.validated_at,
            });
        }

        sqlx::query(
            "UPDATE tickets SET status = 'CANCELLED' WHERE reservation_id = $1 AND status = 'VALID'",
        )
        .bind(reservation_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        for ticket in &mut tickets {
            ticket.status = TicketStatus::Cancelled;
        }
        debug!(%reservation_id, %at, tickets = tickets.len(), "Reservation cancelled");
        Ok(reservation_from_row(row, tickets))
    }

    // ============================================
    // Tickets
    // ============================================

    pub async fn get_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>, AppError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE redemption_code = $1",
            TICKET_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Ticket::try_from).transpose()
    }

    pub async fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE user_id = $1 \
             ORDER BY issued_at, reservation_id, position",
            TICKET_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        tickets_from_rows(rows)
    }

    pub async fn tickets_for_event(&self, event_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE event_id = $1 \
             ORDER BY participant_last_name, participant_first_name, id",
            TICKET_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        tickets_from_rows(rows)
    }

    #[instrument(skip(self))]
    pub async fn mark_ticket_used(
        &self,
        ticket_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Ticket, AppError> {
        let updated = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets SET status = 'USED', validated_at = $2 \
             WHERE id = $1 AND status = 'VALID' RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(ticket_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = updated {
            return Ticket::try_from(row);
        }

        let current = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE id = $1",
            TICKET_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", ticket_id)))?;
        Err(AppError::StateConflict {
            ticket_id,
            status: parse(&current.status)?,
            validated_at: current.validated_at,
        })
    }

    #[instrument(skip(self))]
    pub async fn expire_ended_tickets(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let expired = sqlx::query(
            "UPDATE tickets t SET status = 'EXPIRED' FROM events e \
             WHERE t.event_id = e.id AND e.end_time <= $1 AND t.status = 'VALID'",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(expired)
    }
}

fn reservation_from_row(row: ReservationRow, tickets: Vec<Ticket>) -> Reservation {
    Reservation {
        id: row.id,
        user_id: row.user_id,
        reserved_at: row.reserved_at,
        total_amount: row.total_amount,
        idempotency_key: row.idempotency_key,
        tickets,
    }
}

async fn attach_tickets(
    conn: &mut PgConnection,
    row: ReservationRow,
) -> Result<Reservation, AppError> {
    let ticket_rows = sqlx::query_as::<_, TicketRow>(&format!(
        "SELECT {} FROM tickets WHERE reservation_id = $1 ORDER BY position",
        TICKET_COLUMNS
    ))
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(reservation_from_row(row, tickets_from_rows(ticket_rows)?))
}

async fn load_event(
    conn: &mut PgConnection,
    event_id: Uuid,
    for_update: bool,
) -> Result<Option<Event>, AppError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, EventRow>(&format!(
        "SELECT {} FROM events WHERE id = $1{}",
        EVENT_COLUMNS, lock
    ))
    .bind(event_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(attach_zones(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Live events of a structure whose window intersects `[start, end)`.
async fn load_overlapping_events(
    conn: &mut PgConnection,
    structure_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Event>, AppError> {
    let rows = sqlx::query_as::<_, EventRow>(&format!(
        "SELECT {} FROM events \
         WHERE structure_id = $1 AND NOT deleted AND status <> 'CANCELLED' \
           AND start_time < $3 AND $2 < end_time",
        EVENT_COLUMNS
    ))
    .bind(structure_id)
    .bind(start)
    .bind(end)
    .fetch_all(&mut *conn)
    .await?;
    attach_zones(conn, rows).await
}

async fn attach_zones(conn: &mut PgConnection, rows: Vec<EventRow>) -> Result<Vec<Event>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let zone_rows = sqlx::query_as::<_, ZoneRow>(&format!(
        "SELECT {} FROM event_audience_zones WHERE event_id = ANY($1) ORDER BY event_id, position",
        ZONE_COLUMNS
    ))
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut zones: HashMap<Uuid, Vec<EventAudienceZone>> = HashMap::new();
    for row in zone_rows {
        let zone = EventAudienceZone::try_from(row)?;
        zones.entry(zone.event_id).or_default().push(zone);
    }

    rows.into_iter()
        .map(|row| {
            Ok(Event {
                id: row.id,
                structure_id: row.structure_id,
                name: row.name,
                start_time: row.start_time,
                end_time: row.end_time,
                status: parse(&row.status)?,
                deleted: row.deleted,
                category_ids: row.category_ids.into_iter().collect(),
                zones: zones.remove(&row.id).unwrap_or_default(),
                created_by: row.created_by,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        })
        .collect()
}
