//! Admin CSV export of one day's grid.

use common::keys::DayKey;
use engine::{Engine, EngineError};

use crate::error::ApiError;

struct Row {
    hour: u8,
    gpu: u8,
    price: u32,
    winner: Option<String>,
    actual_user: Option<String>,
}

/// Snapshot a day under the lock, render CSV outside it.
pub async fn day_csv(engine: &Engine, day: DayKey) -> Result<String, ApiError> {
    let rows = engine
        .read(|doc| {
            let d = doc.days.get(&day).ok_or(EngineError::UnknownDay(day))?;
            Ok::<_, EngineError>(
                d.slots
                    .iter()
                    .flat_map(|(hour, slots)| {
                        let hour = hour.0;
                        slots.iter().map(move |s| Row {
                            hour,
                            gpu: s.gpu,
                            price: s.price,
                            winner: s.winner.clone(),
                            actual_user: s.actual_user.clone(),
                        })
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .await?;

    render(day, &rows).map_err(|e| {
        tracing::error!(error = %e, "csv rendering failed");
        ApiError::from(EngineError::Inconsistency("csv export failed".to_string()))
    })
}

fn render(day: DayKey, rows: &[Row]) -> Result<String, anyhow::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["day", "hour", "gpu", "price", "winner", "actual_user"])?;
    for row in rows {
        writer.write_record([
            day.to_string(),
            row.hour.to_string(),
            row.gpu.to_string(),
            row.price.to_string(),
            row.winner.clone().unwrap_or_default(),
            row.actual_user.clone().unwrap_or_default(),
        ])?;
    }
    Ok(String::from_utf8(writer.into_inner()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_header_and_rows() {
        let day: DayKey = "2025-06-10".parse().unwrap();
        let rows = vec![
            Row {
                hour: 14,
                gpu: 0,
                price: 3,
                winner: Some("ada".to_string()),
                actual_user: Some("bob".to_string()),
            },
            Row {
                hour: 14,
                gpu: 1,
                price: 0,
                winner: None,
                actual_user: None,
            },
        ];

        let csv = render(day, &rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("day,hour,gpu,price,winner,actual_user"));
        assert_eq!(lines.next(), Some("2025-06-10,14,0,3,ada,bob"));
        assert_eq!(lines.next(), Some("2025-06-10,14,1,0,,"));
        assert_eq!(lines.next(), None);
    }
}
