use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::AuthenticatedUser,
        booking::BookingStatus,
        payment::{PaymentRecordStatus, ReportQuery},
        service::ServiceCategory,
        user::Permission,
    },
    services::metrics,
};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Week,
    Month,
    HalfYear,
    Year,
}

impl Timeframe {
    pub fn days(self) -> i64 {
        match self {
            Timeframe::Week => 7,
            Timeframe::Month => 30,
            Timeframe::HalfYear => 182,
            Timeframe::Year => 365,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::HalfYear => "half_year",
            Timeframe::Year => "year",
        }
    }

    /// `[now - span, now]`
    pub fn window(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - Duration::days(self.days()), now)
    }
}

impl FromStr for Timeframe {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(Timeframe::Week),
            "month" => Ok(Timeframe::Month),
            "half_year" => Ok(Timeframe::HalfYear),
            "year" => Ok(Timeframe::Year),
            other => Err(AppError::bad_request(format!(
                "Invalid timeframe '{other}': expected week, month, half_year or year"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Full,
    Payments,
    Services,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Full => "full",
            ReportType::Payments => "payments",
            ReportType::Services => "services",
        }
    }

    fn includes_payments(self) -> bool {
        matches!(self, ReportType::Full | ReportType::Payments)
    }

    fn includes_services(self) -> bool {
        matches!(self, ReportType::Full | ReportType::Services)
    }
}

impl FromStr for ReportType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ReportType::Full),
            "payments" => Ok(ReportType::Payments),
            "services" => Ok(ReportType::Services),
            other => Err(AppError::bad_request(format!(
                "Invalid report type '{other}': expected full, payments or services"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct ReportSummary {
    pub payment_count: i64,
    pub completed_total: Decimal,
    pub processing_total: Decimal,
    pub failed_count: i64,
    pub bookings_created: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentLine {
    pub transaction_id: String,
    pub client_name: Option<String>,
    pub deceased_name: String,
    pub amount: Decimal,
    pub payment_method: String,
    pub status: PaymentRecordStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceRevenue {
    pub service_name: String,
    pub category: ServiceCategory,
    pub quantity: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone)]
pub struct ReportData {
    pub timeframe: Timeframe,
    pub report_type: ReportType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: ReportSummary,
    pub payments: Vec<PaymentLine>,
    pub services: Vec<ServiceRevenue>,
}

/// Rendered workbook ready to send.
pub struct ReportFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn parse_query(query: &ReportQuery) -> AppResult<(Timeframe, ReportType)> {
    let timeframe = query.timeframe.as_deref().unwrap_or("month").parse()?;
    let report_type = query.report_type.as_deref().unwrap_or("full").parse()?;
    Ok((timeframe, report_type))
}

pub fn file_name(data: &ReportData) -> String {
    format!(
        "report-{}-{}-{}.xlsx",
        data.report_type.as_str(),
        data.timeframe.as_str(),
        data.end.format("%Y-%m-%d")
    )
}

fn money(value: Decimal) -> f64 {
    value.round_dp(2).to_f64().unwrap_or_default()
}

fn write_headers(sheet: &mut Worksheet, headers: &[&str], bold: &Format) -> Result<(), XlsxError> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, bold)?;
        sheet.set_column_width(col as u16, 22)?;
    }
    Ok(())
}

/// Writes the summary sheet plus the payments and/or services sheets the
/// report type asks for.
pub fn render_workbook(data: &ReportData, path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let money_fmt = Format::new().set_num_format("#,##0.00");

    let summary = workbook.add_worksheet();
    summary.set_name("Summary")?;
    summary.set_column_width(0, 28)?;
    summary.set_column_width(1, 24)?;
    summary.write_string_with_format(0, 0, "Funeral home report", &bold)?;
    let rows: [(&str, String); 4] = [
        ("Report type", data.report_type.as_str().to_string()),
        ("Timeframe", data.timeframe.as_str().to_string()),
        ("From", data.start.format("%Y-%m-%d %H:%M").to_string()),
        ("To", data.end.format("%Y-%m-%d %H:%M").to_string()),
    ];
    for (i, (label, value)) in rows.iter().enumerate() {
        let row = i as u32 + 2;
        summary.write_string_with_format(row, 0, *label, &bold)?;
        summary.write_string(row, 1, value)?;
    }
    let s = &data.summary;
    summary.write_string_with_format(7, 0, "Bookings created", &bold)?;
    summary.write_number(7, 1, s.bookings_created as f64)?;
    summary.write_string_with_format(8, 0, "Payments", &bold)?;
    summary.write_number(8, 1, s.payment_count as f64)?;
    summary.write_string_with_format(9, 0, "Completed amount", &bold)?;
    summary.write_number_with_format(9, 1, money(s.completed_total), &money_fmt)?;
    summary.write_string_with_format(10, 0, "Processing amount", &bold)?;
    summary.write_number_with_format(10, 1, money(s.processing_total), &money_fmt)?;
    summary.write_string_with_format(11, 0, "Failed payments", &bold)?;
    summary.write_number(11, 1, s.failed_count as f64)?;

    if data.report_type.includes_payments() {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Payments")?;
        write_headers(
            sheet,
            &["Date", "Transaction", "Client", "Deceased", "Method", "Status", "Amount"],
            &bold,
        )?;
        for (i, p) in data.payments.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, p.created_at.format("%Y-%m-%d %H:%M").to_string())?;
            sheet.write_string(row, 1, &p.transaction_id)?;
            sheet.write_string(row, 2, p.client_name.as_deref().unwrap_or("-"))?;
            sheet.write_string(row, 3, &p.deceased_name)?;
            sheet.write_string(row, 4, &p.payment_method)?;
            sheet.write_string(row, 5, p.status.as_str())?;
            sheet.write_number_with_format(row, 6, money(p.amount), &money_fmt)?;
        }
    }

    if data.report_type.includes_services() {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Services")?;
        write_headers(sheet, &["Service", "Category", "Quantity", "Revenue"], &bold)?;
        for (i, svc) in data.services.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, &svc.service_name)?;
            sheet.write_string(row, 1, svc.category.as_str())?;
            sheet.write_number(row, 2, svc.quantity as f64)?;
            sheet.write_number_with_format(row, 3, money(svc.revenue), &money_fmt)?;
        }
    }

    workbook.save(path)
}

pub struct ReportService;

impl ReportService {
    pub async fn collect(
        pool: &PgPool,
        timeframe: Timeframe,
        report_type: ReportType,
        now: DateTime<Utc>,
    ) -> AppResult<ReportData> {
        let (start, end) = timeframe.window(now);

        let mut summary = sqlx::query_as::<_, ReportSummary>(
            "SELECT COUNT(*) AS payment_count,
                    COALESCE(SUM(amount) FILTER (WHERE status = $3), 0) AS completed_total,
                    COALESCE(SUM(amount) FILTER (WHERE status = $4), 0) AS processing_total,
                    COUNT(*) FILTER (WHERE status = $5) AS failed_count,
                    0::BIGINT AS bookings_created
             FROM payments
             WHERE created_at BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .bind(PaymentRecordStatus::Completed)
        .bind(PaymentRecordStatus::Processing)
        .bind(PaymentRecordStatus::Failed)
        .fetch_one(pool)
        .await?;

        summary.bookings_created = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE created_at BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?;

        let payments = if report_type.includes_payments() {
            sqlx::query_as::<_, PaymentLine>(
                "SELECT p.transaction_id, u.name AS client_name,
                        d.first_name || ' ' || d.last_name AS deceased_name,
                        p.amount, p.payment_method, p.status, p.created_at
                 FROM payments p
                 JOIN bookings b ON b.id = p.booking_id
                 JOIN deceased d ON d.id = b.deceased_id
                 LEFT JOIN users u ON u.id = b.user_id
                 WHERE p.created_at BETWEEN $1 AND $2
                 ORDER BY p.created_at",
            )
            .bind(start)
            .bind(end)
            .fetch_all(pool)
            .await?
        } else {
            Vec::new()
        };

        let services = if report_type.includes_services() {
            sqlx::query_as::<_, ServiceRevenue>(
                "SELECT s.name AS service_name, s.category,
                        SUM(bs.quantity)::BIGINT AS quantity,
                        SUM(bs.price_at_booking * bs.quantity) AS revenue
                 FROM booking_services bs
                 JOIN bookings b ON b.id = bs.booking_id
                 JOIN services s ON s.id = bs.service_id
                 WHERE b.created_at BETWEEN $1 AND $2 AND b.status <> $3
                 GROUP BY s.id, s.name, s.category
                 ORDER BY revenue DESC, s.name",
            )
            .bind(start)
            .bind(end)
            .bind(BookingStatus::Cancelled)
            .fetch_all(pool)
            .await?
        } else {
            Vec::new()
        };

        Ok(ReportData { timeframe, report_type, start, end, summary, payments, services })
    }

    /// Renders to a temporary file in `report_dir`, reads it back and
    /// removes it. A failed removal is only logged.
    pub async fn generate(
        pool: &PgPool,
        requester: &AuthenticatedUser,
        report_dir: &str,
        query: &ReportQuery,
    ) -> AppResult<ReportFile> {
        requester.authorize(Permission::GenerateReports)?;
        let (timeframe, report_type) = parse_query(query)?;

        let data = Self::collect(pool, timeframe, report_type, Utc::now()).await?;
        let filename = file_name(&data);
        let path = PathBuf::from(report_dir).join(format!("{}.xlsx", Uuid::new_v4()));

        let render_path = path.clone();
        tokio::task::spawn_blocking(move || render_workbook(&data, &render_path))
            .await
            .map_err(|e| anyhow::anyhow!("report task failed: {e}"))?
            .map_err(|e| anyhow::anyhow!("failed to render report: {e}"))?;

        let bytes = tokio::fs::read(&path).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), "failed to remove temporary report: {e}");
        }
        let bytes = bytes?;

        metrics::REPORTS_COUNTER.with_label_values(&[report_type.as_str()]).inc();
        tracing::info!(%filename, size = bytes.len(), "report generated");
        Ok(ReportFile { filename, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Data, Reader, Xlsx};
    use chrono::TimeZone;

    fn sample(report_type: ReportType) -> ReportData {
        let now = Utc.with_ymd_and_hms(2026, 5, 31, 12, 0, 0).unwrap();
        let (start, end) = Timeframe::Month.window(now);
        ReportData {
            timeframe: Timeframe::Month,
            report_type,
            start,
            end,
            summary: ReportSummary {
                payment_count: 2,
                completed_total: Decimal::new(25000, 2),
                processing_total: Decimal::new(5000, 2),
                failed_count: 0,
                bookings_created: 1,
            },
            payments: vec![PaymentLine {
                transaction_id: "MP260530101010ABCDEF".into(),
                client_name: Some("Ann Client".into()),
                deceased_name: "John Doe".into(),
                amount: Decimal::new(25000, 2),
                payment_method: "mpesa".into(),
                status: PaymentRecordStatus::Completed,
                created_at: now - Duration::days(1),
            }],
            services: vec![ServiceRevenue {
                service_name: "Embalming".into(),
                category: ServiceCategory::Preparation,
                quantity: 2,
                revenue: Decimal::new(200, 0),
            }],
        }
    }

    #[test]
    fn windows_have_fixed_spans() {
        let now = Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap();
        let (start, end) = Timeframe::HalfYear.window(now);
        assert_eq!(end, now);
        assert_eq!((end - start).num_days(), 182);
        assert_eq!(Timeframe::Week.days(), 7);
        assert_eq!(Timeframe::Year.days(), 365);
    }

    #[test]
    fn query_defaults_and_rejections() {
        let q = ReportQuery { timeframe: None, report_type: None };
        assert_eq!(parse_query(&q).unwrap(), (Timeframe::Month, ReportType::Full));

        let q = ReportQuery { timeframe: Some("decade".into()), report_type: None };
        assert!(parse_query(&q).is_err());

        let q = ReportQuery { timeframe: Some("week".into()), report_type: Some("taxes".into()) };
        assert!(parse_query(&q).is_err());
    }

    #[test]
    fn file_name_carries_type_timeframe_and_date() {
        assert_eq!(file_name(&sample(ReportType::Payments)), "report-payments-month-2026-05-31.xlsx");
    }

    #[test]
    fn full_report_has_three_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("full.xlsx");
        render_workbook(&sample(ReportType::Full), &path).unwrap();

        let mut wb: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Summary", "Payments", "Services"]);

        let summary = wb.worksheet_range("Summary").unwrap();
        assert_eq!(summary.get_value((9, 1)), Some(&Data::Float(250.0)));

        let payments = wb.worksheet_range("Payments").unwrap();
        assert_eq!(payments.get_value((0, 1)), Some(&Data::String("Transaction".into())));
        assert_eq!(payments.get_value((1, 3)), Some(&Data::String("John Doe".into())));

        let services = wb.worksheet_range("Services").unwrap();
        assert_eq!(services.get_value((1, 0)), Some(&Data::String("Embalming".into())));
        assert_eq!(services.get_value((1, 2)), Some(&Data::Float(2.0)));
    }

    #[test]
    fn services_report_skips_payments_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.xlsx");
        render_workbook(&sample(ReportType::Services), &path).unwrap();

        let wb: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Summary", "Services"]);
    }
}
