//! Lazy site enumeration over the paginated site list.

use crate::error::{Result, SweepError};
use crate::sweep::model::SiteDescriptor;
use crate::sweep::provider::TenantSession;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct EnumerateOptions {
    pub include_personal_sites: bool,
    pub max_sites: Option<usize>,
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Stream every site collection of the tenant.
///
/// Pages are fetched on demand: a consumer that stops early, or the `max_sites` cap,
/// leaves later pages unfetched. Personal sites are filtered per page, duplicate URLs
/// are dropped. A failed page fetch yields one `SweepError::Enumeration` and ends the
/// stream; the sequence cannot be restarted.
pub fn list_sites(
    tenant: Arc<dyn TenantSession>,
    options: EnumerateOptions,
) -> BoxStream<'static, Result<SiteDescriptor>> {
    let pages = stream::try_unfold(Cursor::Start, move |cursor| {
        let tenant = tenant.clone();
        async move {
            let next_link = match cursor {
                Cursor::Done => return Ok(None),
                Cursor::Start => None,
                Cursor::Next(link) => Some(link),
            };

            let page = tenant
                .list_sites_page(next_link.as_deref())
                .await
                .map_err(|e| SweepError::Enumeration(e.to_string()))?;

            tracing::debug!(
                sites = page.sites.len(),
                more = page.next_link.is_some(),
                "Fetched site page"
            );

            let cursor = match page.next_link {
                Some(link) => Cursor::Next(link),
                None => Cursor::Done,
            };
            Ok::<_, SweepError>(Some((page.sites, cursor)))
        }
    });

    let include_personal = options.include_personal_sites;
    let mut seen = HashSet::new();

    let sites = pages
        .map_ok(move |sites| {
            stream::iter(
                sites
                    .into_iter()
                    .filter(move |site| include_personal || !site.is_personal_site)
                    .map(Ok::<_, SweepError>),
            )
        })
        .try_flatten()
        .try_filter(move |site| {
            let fresh = seen.insert(site.url.to_lowercase());
            if !fresh {
                tracing::debug!(url = %site.url, "Skipping duplicate site");
            }
            futures::future::ready(fresh)
        });

    match options.max_sites {
        Some(max) => sites.take(max).boxed(),
        None => sites.boxed(),
    }
}
