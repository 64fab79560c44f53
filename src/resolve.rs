//! Sender → directory resolution.
//!
//! Order, first hit wins:
//! 1. a contact with exactly this email (ASCII case ignored); its company
//!    comes along when it has one;
//! 2. otherwise a company whose website contains the sender's domain.
//!
//! Several companies can share a domain substring. A website whose host is
//! the domain itself (`www.` ignored) beats a mere substring match, then the
//! most recently updated company wins, then the smallest id.
//!
//! Resolution only links to existing rows; it never creates any.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::directory::{companies_with_website_containing, find_contact_by_email, get_company};
use crate::models::{Company, Contact};

/// Directory rows linked to one sender. Either side may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relations {
    pub company: Option<Company>,
    pub contact: Option<Contact>,
}

pub async fn resolve_relations(pool: &SqlitePool, sender_email: &str) -> Result<Relations> {
    let sender_email = sender_email.trim();
    if sender_email.is_empty() {
        return Ok(Relations::default());
    }

    let contact = find_contact_by_email(pool, sender_email).await?;
    let mut company = match contact.as_ref().and_then(|c| c.company_id.as_deref()) {
        Some(company_id) => get_company(pool, company_id).await?,
        None => None,
    };

    if company.is_none() {
        if let Some(domain) = email_domain(sender_email) {
            company = best_domain_match(pool, &domain).await?;
        }
    }

    Ok(Relations { company, contact })
}

async fn best_domain_match(pool: &SqlitePool, domain: &str) -> Result<Option<Company>> {
    let mut candidates = companies_with_website_containing(pool, domain).await?;
    candidates.sort_by(|a, b| {
        let a_exact = host_matches(a.website_url.as_deref(), domain);
        let b_exact = host_matches(b.website_url.as_deref(), domain);
        b_exact
            .cmp(&a_exact)
            .then(b.updated_at.cmp(&a.updated_at))
            .then(a.id.cmp(&b.id))
    });
    Ok(candidates.into_iter().next())
}

/// Lowercased text after the last `@`, if any.
pub fn email_domain(email: &str) -> Option<String> {
    let (_, domain) = email.rsplit_once('@')?;
    let domain = domain.trim().trim_end_matches('>').to_ascii_lowercase();
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

/// Host part of a website URL: scheme, credentials, port, path and `www.` removed.
pub fn website_host(url: &str) -> String {
    let url = url.trim();
    let without_scheme = match url.find("://") {
        Some(ix) => &url[ix + 3..],
        None => url,
    };
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let host = host.to_ascii_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

fn host_matches(url: Option<&str>, domain: &str) -> bool {
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    url.map(|u| website_host(u) == domain).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::directory::{add_company, add_contact, NewCompany, NewContact};
    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_db(tmp.path().join("crm.sqlite"));
        let pool = db::connect(&config).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        (tmp, pool)
    }

    async fn company(pool: &SqlitePool, name: &str, website: &str) -> Company {
        add_company(
            pool,
            &NewCompany {
                name: name.into(),
                website_url: Some(website.into()),
                email: None,
            },
        )
        .await
        .unwrap()
    }

    async fn set_updated_at(pool: &SqlitePool, id: &str, ts: i64) {
        sqlx::query("UPDATE companies SET updated_at = ? WHERE id = ?")
            .bind(ts)
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_contact_match_beats_domain_match() {
        let (_tmp, pool) = test_pool().await;
        let x = company(&pool, "Company X", "https://example.org").await;
        company(&pool, "Company Y", "https://x.com").await;
        let contact = add_contact(
            &pool,
            &NewContact {
                company_id: Some(x.id.clone()),
                first_name: "A".into(),
                last_name: "Person".into(),
                email: Some("a@x.com".into()),
            },
        )
        .await
        .unwrap();

        let rel = resolve_relations(&pool, "a@x.com").await.unwrap();
        assert_eq!(rel.contact.map(|c| c.id), Some(contact.id));
        assert_eq!(rel.company.map(|c| c.name), Some("Company X".to_string()));
    }

    #[tokio::test]
    async fn test_domain_fallback_without_contact() {
        let (_tmp, pool) = test_pool().await;
        company(&pool, "Acme", "https://www.acme.com").await;

        let rel = resolve_relations(&pool, "someone@acme.com").await.unwrap();
        assert!(rel.contact.is_none());
        assert_eq!(rel.company.map(|c| c.name), Some("Acme".to_string()));
    }

    #[tokio::test]
    async fn test_contact_without_company_falls_back_to_domain() {
        let (_tmp, pool) = test_pool().await;
        company(&pool, "Acme", "acme.com").await;
        add_contact(
            &pool,
            &NewContact {
                company_id: None,
                first_name: "Loose".into(),
                last_name: "Contact".into(),
                email: Some("loose@acme.com".into()),
            },
        )
        .await
        .unwrap();

        let rel = resolve_relations(&pool, "loose@acme.com").await.unwrap();
        assert_eq!(rel.contact.map(|c| c.first_name), Some("Loose".to_string()));
        assert_eq!(rel.company.map(|c| c.name), Some("Acme".to_string()));
    }

    #[tokio::test]
    async fn test_no_match() {
        let (_tmp, pool) = test_pool().await;
        company(&pool, "Acme", "https://acme.com").await;

        assert_eq!(
            resolve_relations(&pool, "nobody@elsewhere.net").await.unwrap(),
            Relations::default()
        );
        assert_eq!(
            resolve_relations(&pool, "").await.unwrap(),
            Relations::default()
        );
        assert_eq!(
            resolve_relations(&pool, "no-at-sign").await.unwrap(),
            Relations::default()
        );
    }

    #[tokio::test]
    async fn test_exact_host_beats_substring() {
        let (_tmp, pool) = test_pool().await;
        let sub = company(&pool, "Reseller", "https://shop.acme.com.tr/partners").await;
        let exact = company(&pool, "Acme", "http://www.acme.com").await;
        // the substring match is newer, the exact host must still win
        set_updated_at(&pool, &sub.id, 2_000).await;
        set_updated_at(&pool, &exact.id, 1_000).await;

        let rel = resolve_relations(&pool, "info@acme.com").await.unwrap();
        assert_eq!(rel.company.map(|c| c.name), Some("Acme".to_string()));
    }

    #[tokio::test]
    async fn test_most_recent_wins_among_substring_matches() {
        let (_tmp, pool) = test_pool().await;
        let older = company(&pool, "Older", "https://acme.com.tr").await;
        let newer = company(&pool, "Newer", "https://acme.com.de").await;
        set_updated_at(&pool, &older.id, 1_000).await;
        set_updated_at(&pool, &newer.id, 5_000).await;

        let rel = resolve_relations(&pool, "info@acme.com").await.unwrap();
        assert_eq!(rel.company.map(|c| c.name), Some("Newer".to_string()));
    }

    #[test]
    fn test_website_host() {
        assert_eq!(website_host("https://www.Acme.com/about"), "acme.com");
        assert_eq!(website_host("acme.com"), "acme.com");
        assert_eq!(website_host("http://user@acme.com:8080?q=1"), "acme.com");
    }

    #[test]
    fn test_email_domain() {
        assert_eq!(email_domain("Jane@Acme.COM"), Some("acme.com".to_string()));
        assert_eq!(email_domain("jane@"), None);
        assert_eq!(email_domain("jane"), None);
    }
}
