use chrono::Utc;
use iloved_common::product::ProductId;
use iloved_common::report::{validate_report_text, Report, ReportStatus};
use iloved_docstore::{auto_id, to_fields, DocumentStore, Write};

use crate::catalog::get_product;
use crate::error::InboxResult;
use crate::schema::{self, field};
use crate::session::Session;

/// File a report against a listing. Both the reason and the details are required.
pub async fn report_product<S: DocumentStore>(
    store: &S,
    session: &Session,
    product: &ProductId,
    reason: &str,
    details: &str,
) -> InboxResult<Report> {
    let (reason, details) = validate_report_text(reason, details)?;
    let listing = get_product(store, product).await?;

    let mut report = Report {
        reporter: session.user.clone(),
        product: product.clone(),
        product_name: listing.name.clone(),
        product_image: listing.cover_image().map(str::to_string),
        reason,
        details,
        status: ReportStatus::Pending,
        created_at: Utc::now(),
    };
    let path = schema::reports()?.doc(&auto_id())?;
    let write = Write::create(path.clone(), to_fields(&report)?).with_server_timestamp(field::CREATED_AT);
    report.created_at = store.commit(write.into()).await?.commit_time;
    tracing::info!(report = %path, %product, reporter = %session.user, "product reported");
    Ok(report)
}
