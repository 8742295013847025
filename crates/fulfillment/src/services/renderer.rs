//! Order document rendering.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use catalog::OrderGraph;
use chrono::Utc;
use common::{DocumentRef, OrderId};
use uuid::Uuid;

use super::escape_html;
use crate::error::RenderError;

/// Produces the order document and returns where it is stored.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, graph: &OrderGraph) -> Result<DocumentRef, RenderError>;

    /// Removes a document that will not be kept. Best effort.
    async fn discard(&self, document: &DocumentRef) -> Result<(), RenderError>;
}

#[async_trait]
impl<T: DocumentRenderer + ?Sized> DocumentRenderer for Arc<T> {
    async fn render(&self, graph: &OrderGraph) -> Result<DocumentRef, RenderError> {
        (**self).render(graph).await
    }

    async fn discard(&self, document: &DocumentRef) -> Result<(), RenderError> {
        (**self).discard(document).await
    }
}

/// Writes an HTML order document to a directory on disk.
///
/// Each render produces a new file `order-<number>-<uuid>.html`, so a
/// retried attempt never overwrites the document of an earlier one.
#[derive(Debug, Clone)]
pub struct FileDocumentRenderer {
    root: PathBuf,
}

impl FileDocumentRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl DocumentRenderer for FileDocumentRenderer {
    #[tracing::instrument(skip(self, graph), fields(order_number = %graph.order.order_number))]
    async fn render(&self, graph: &OrderGraph) -> Result<DocumentRef, RenderError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let file_name = format!("order-{}-{}.html", graph.order.order_number, Uuid::new_v4());
        let path = self.root.join(file_name);
        tokio::fs::write(&path, render_html(graph)).await?;

        tracing::debug!(path = %path.display(), "order document written");
        Ok(DocumentRef::new(path.to_string_lossy()))
    }

    async fn discard(&self, document: &DocumentRef) -> Result<(), RenderError> {
        match tokio::fs::remove_file(document.as_str()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn optional(value: &Option<String>) -> String {
    value.as_deref().map(escape_html).unwrap_or_default()
}

/// Renders the order graph as a standalone HTML page.
pub fn render_html(graph: &OrderGraph) -> String {
    let order = &graph.order;
    let currency = escape_html(&order.currency);
    let date = order
        .submitted_at
        .unwrap_or(order.created_at)
        .format("%Y-%m-%d %H:%M UTC");

    let mut rows = String::new();
    for line in &graph.lines {
        // Writing into a String cannot fail.
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{currency} {}</td><td>{currency} {}</td></tr>",
            escape_html(&line.variant.sku),
            escape_html(&line.product.name),
            escape_html(&line.variant.name),
            line.item.quantity,
            line.item.unit_price,
            line.item.line_total,
        );
    }

    let creator = graph
        .creator
        .as_ref()
        .map(|u| escape_html(&format!("{} {} <{}>", u.first_name, u.last_name, u.email)))
        .unwrap_or_default();
    let price_list = graph
        .price_list
        .as_ref()
        .map(|p| escape_html(&p.name))
        .unwrap_or_default();
    let notes = order
        .notes
        .as_deref()
        .map(|n| format!("<p><strong>Notes:</strong> {}</p>", escape_html(n)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Order {number}</title></head>
<body>
<h1>ORDER {number}</h1>
<p>Date: {date}</p>
<h3>FROM</h3>
<p><strong>{org_name}</strong></p><p>{org_address}</p><p>{org_email}</p><p>{org_phone}</p>
<p>Ordered by: {creator}</p>
<h3>TO</h3>
<p><strong>{factory_name}</strong></p><p>{factory_address}</p><p>{factory_email}</p><p>{factory_phone}</p>
<p>Price list: {price_list}</p>
<table>
<thead><tr><th>SKU</th><th>Product</th><th>Variant</th><th>Quantity</th><th>Unit Price</th><th>Total</th></tr></thead>
<tbody>{rows}</tbody>
</table>
<p><strong>Total: {currency} {total}</strong></p>
{notes}
<p>Generated {generated}</p>
</body>
</html>
"#,
        number = escape_html(&order.order_number),
        org_name = escape_html(&graph.organization.name),
        org_address = optional(&graph.organization.address),
        org_email = optional(&graph.organization.email),
        org_phone = optional(&graph.organization.phone),
        factory_name = escape_html(&graph.factory.name),
        factory_address = optional(&graph.factory.address),
        factory_email = escape_html(&graph.factory.contact_email),
        factory_phone = optional(&graph.factory.contact_phone),
        total = order.total_amount,
        generated = Utc::now().to_rfc3339(),
    )
}

#[derive(Debug, Default)]
struct InMemoryRendererState {
    documents: HashMap<String, OrderId>,
    discarded: Vec<DocumentRef>,
    render_calls: u32,
    fail_next: u32,
    fail_always: bool,
    stall: Option<Duration>,
}

/// In-memory renderer for tests, with failure and stall injection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentRenderer {
    state: Arc<RwLock<InMemoryRendererState>>,
}

impl InMemoryDocumentRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryRendererState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryRendererState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Fails every render until reset.
    pub fn set_fail(&self, fail: bool) {
        self.write().fail_always = fail;
    }

    /// Fails the next `count` renders.
    pub fn fail_next(&self, count: u32) {
        self.write().fail_next = count;
    }

    /// Delays every render by `stall`.
    pub fn set_stall(&self, stall: Option<Duration>) {
        self.write().stall = stall;
    }

    pub fn render_calls(&self) -> u32 {
        self.read().render_calls
    }

    /// Documents rendered and not discarded.
    pub fn document_count(&self) -> usize {
        self.read().documents.len()
    }

    pub fn discarded(&self) -> Vec<DocumentRef> {
        self.read().discarded.clone()
    }
}

#[async_trait]
impl DocumentRenderer for InMemoryDocumentRenderer {
    async fn render(&self, graph: &OrderGraph) -> Result<DocumentRef, RenderError> {
        let stall = {
            let mut state = self.write();
            state.render_calls += 1;
            state.stall
        };
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }

        let mut state = self.write();
        if state.fail_always {
            return Err(RenderError::Failed("renderer unavailable".to_string()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(RenderError::Failed("renderer unavailable".to_string()));
        }

        let document = DocumentRef::new(format!(
            "memory://orders/{}/{}",
            graph.order.order_number, state.render_calls
        ));
        state
            .documents
            .insert(document.as_str().to_string(), graph.order.id);
        Ok(document)
    }

    async fn discard(&self, document: &DocumentRef) -> Result<(), RenderError> {
        let mut state = self.write();
        state.documents.remove(document.as_str());
        state.discarded.push(document.clone());
        Ok(())
    }
}
