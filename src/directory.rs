//! Company and contact directory.
//!
//! The ingestion pipeline only reads these tables; rows are created through
//! the `company add` / `contact add` commands.

use anyhow::{bail, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, escape_like};
use crate::models::{Company, Contact};

/// Fields for a new company.
#[derive(Debug, Clone, Default)]
pub struct NewCompany {
    pub name: String,
    pub website_url: Option<String>,
    pub email: Option<String>,
}

/// Fields for a new contact.
#[derive(Debug, Clone, Default)]
pub struct NewContact {
    pub company_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

const COMPANY_COLUMNS: &str = "id, name, website_url, email, created_at, updated_at";
const CONTACT_COLUMNS: &str =
    "id, company_id, first_name, last_name, email, created_at, updated_at";

fn company_from_row(row: &SqliteRow) -> Company {
    Company {
        id: row.get("id"),
        name: row.get("name"),
        website_url: row.get("website_url"),
        email: row.get("email"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn contact_from_row(row: &SqliteRow) -> Contact {
    Contact {
        id: row.get("id"),
        company_id: row.get("company_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn add_company(pool: &SqlitePool, new: &NewCompany) -> Result<Company> {
    if new.name.trim().is_empty() {
        bail!("company name must not be empty");
    }
    let now = chrono::Utc::now().timestamp();
    let company = Company {
        id: Uuid::new_v4().to_string(),
        name: new.name.trim().to_string(),
        website_url: non_empty(&new.website_url),
        email: non_empty(&new.email),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO companies (id, name, website_url, email, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&company.id)
    .bind(&company.name)
    .bind(&company.website_url)
    .bind(&company.email)
    .bind(company.created_at)
    .bind(company.updated_at)
    .execute(pool)
    .await?;

    Ok(company)
}

pub async fn add_contact(pool: &SqlitePool, new: &NewContact) -> Result<Contact> {
    if new.first_name.trim().is_empty() && new.last_name.trim().is_empty() {
        bail!("contact needs a first or last name");
    }
    if let Some(company_id) = &new.company_id {
        if get_company(pool, company_id).await?.is_none() {
            bail!("company not found: {}", company_id);
        }
    }

    let now = chrono::Utc::now().timestamp();
    let contact = Contact {
        id: Uuid::new_v4().to_string(),
        company_id: new.company_id.clone(),
        first_name: new.first_name.trim().to_string(),
        last_name: new.last_name.trim().to_string(),
        email: non_empty(&new.email),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO contacts (id, company_id, first_name, last_name, email, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&contact.id)
    .bind(&contact.company_id)
    .bind(&contact.first_name)
    .bind(&contact.last_name)
    .bind(&contact.email)
    .bind(contact.created_at)
    .bind(contact.updated_at)
    .execute(pool)
    .await?;

    Ok(contact)
}

pub async fn get_company(pool: &SqlitePool, id: &str) -> Result<Option<Company>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM companies WHERE id = ?",
        COMPANY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(company_from_row))
}

pub async fn list_companies(pool: &SqlitePool) -> Result<Vec<Company>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM companies ORDER BY created_at DESC, name ASC",
        COMPANY_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(company_from_row).collect())
}

pub async fn list_contacts(pool: &SqlitePool) -> Result<Vec<Contact>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM contacts ORDER BY first_name ASC, last_name ASC",
        CONTACT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(contact_from_row).collect())
}

/// Contact whose email equals `email`, ignoring ASCII case.
pub async fn find_contact_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Contact>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM contacts WHERE email = ? COLLATE NOCASE ORDER BY created_at ASC, id ASC LIMIT 1",
        CONTACT_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(contact_from_row))
}

/// Companies whose website URL contains `domain`, ignoring ASCII case.
pub async fn companies_with_website_containing(
    pool: &SqlitePool,
    domain: &str,
) -> Result<Vec<Company>> {
    let pattern = format!("%{}%", escape_like(domain));
    let rows = sqlx::query(&format!(
        "SELECT {} FROM companies WHERE website_url LIKE ? ESCAPE '\\'",
        COMPANY_COLUMNS
    ))
    .bind(pattern)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(company_from_row).collect())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ============ CLI entry points ============

pub async fn run_add_company(config: &Config, new: &NewCompany) -> Result<()> {
    let pool = db::connect(config).await?;
    let company = add_company(&pool, new).await?;
    println!("company added: {}", company.id);
    pool.close().await;
    Ok(())
}

pub async fn run_add_contact(config: &Config, new: &NewContact) -> Result<()> {
    let pool = db::connect(config).await?;
    let contact = add_contact(&pool, new).await?;
    println!("contact added: {}", contact.id);
    pool.close().await;
    Ok(())
}

pub async fn run_list_companies(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let companies = list_companies(&pool).await?;
    pool.close().await;

    println!("{:<38} {:<28} WEBSITE", "ID", "NAME");
    for company in &companies {
        println!(
            "{:<38} {:<28} {}",
            company.id,
            company.name,
            company.website_url.as_deref().unwrap_or("-")
        );
    }
    println!("{} companies", companies.len());
    Ok(())
}

pub async fn run_list_contacts(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let contacts = list_contacts(&pool).await?;
    pool.close().await;

    println!("{:<38} {:<28} {:<32} COMPANY", "ID", "NAME", "EMAIL");
    for contact in &contacts {
        println!(
            "{:<38} {:<28} {:<32} {}",
            contact.id,
            contact.full_name(),
            contact.email.as_deref().unwrap_or("-"),
            contact.company_id.as_deref().unwrap_or("-")
        );
    }
    println!("{} contacts", contacts.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_db(tmp.path().join("crm.sqlite"));
        let pool = db::connect(&config).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        (tmp, pool)
    }

    #[tokio::test]
    async fn test_add_and_find_contact_case_insensitive() {
        let (_tmp, pool) = test_pool().await;
        let company = add_company(
            &pool,
            &NewCompany {
                name: "Acme".into(),
                website_url: Some("https://www.acme.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let contact = add_contact(
            &pool,
            &NewContact {
                company_id: Some(company.id.clone()),
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                email: Some("Jane@Acme.com".into()),
            },
        )
        .await
        .unwrap();

        let found = find_contact_by_email(&pool, "jane@acme.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, contact.id);
        assert_eq!(found.company_id.as_deref(), Some(company.id.as_str()));
    }

    #[tokio::test]
    async fn test_contact_with_unknown_company_rejected() {
        let (_tmp, pool) = test_pool().await;
        let err = add_contact(
            &pool,
            &NewContact {
                company_id: Some("missing".into()),
                first_name: "A".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_website_match_escapes_wildcards() {
        let (_tmp, pool) = test_pool().await;
        add_company(
            &pool,
            &NewCompany {
                name: "Under".into(),
                website_url: Some("https://a_b.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        add_company(
            &pool,
            &NewCompany {
                name: "Other".into(),
                website_url: Some("https://axb.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let found = companies_with_website_containing(&pool, "a_b.com")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Under");
    }

    #[tokio::test]
    async fn test_blank_company_name_rejected() {
        let (_tmp, pool) = test_pool().await;
        assert!(add_company(&pool, &NewCompany::default()).await.is_err());
    }
}
