use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rusqlite::{params, Row};

use crate::db::{
    helpers::{day_param, parse_optional_day, parse_requirements, parse_time, time_param},
    models::{Appointment, Requirement},
    Database,
};
use crate::store::AppointmentStore;

fn row_to_appointment(row: &Row) -> Result<Appointment> {
    let date: Option<String> = row.get("date")?;
    let start_time: Option<String> = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let requirements: String = row.get("requirements")?;

    Ok(Appointment {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        group_id: row.get("group_id")?,
        description: row.get("description")?,
        date: parse_optional_day(date, "date")?,
        start_time: parse_time(start_time, "start_time")?,
        end_time: parse_time(end_time, "end_time")?,
        requirements: parse_requirements(&requirements)?,
    })
}

#[async_trait]
impl AppointmentStore for Database {
    async fn get_appointment(&self, id: &str) -> Result<Option<Appointment>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, group_id, description, date, start_time, end_time, requirements
                 FROM appointments
                 WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![id])?;
            let appointment = match rows.next()? {
                Some(row) => Some(row_to_appointment(row)?),
                None => None,
            };
            Ok(appointment)
        })
        .await
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<()> {
        let record = appointment.clone();
        self.execute(move |conn| {
            let requirements = serde_json::to_string(&record.requirements)?;
            conn.execute(
                "INSERT INTO appointments (id, owner_id, group_id, description, date, start_time,
                                           end_time, requirements)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.owner_id,
                    record.group_id,
                    record.description,
                    record.date.map(day_param),
                    time_param(record.start_time),
                    time_param(record.end_time),
                    requirements,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_requirements(&self, id: &str, requirements: &[Requirement]) -> Result<()> {
        let id = id.to_string();
        let requirements = serde_json::to_string(requirements)?;
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE appointments SET requirements = ?1 WHERE id = ?2",
                params![requirements, id],
            )?;
            if rows_affected == 0 {
                return Err(anyhow!("Appointment {id} not found"));
            }
            Ok(())
        })
        .await
    }
}
