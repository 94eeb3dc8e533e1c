use anyhow::Result;
use libsql::Value;
use serde::Serialize;
use serde_json::json;

use crate::api::{Attributes, JsonApiResource, Page, identifier, require_present};
use crate::db::{Database, NOW};
use crate::error::ValidationErrors;

#[derive(Debug, Clone, Serialize)]
pub struct Stock {
    #[serde(skip_serializing)]
    pub id: i64,
    pub book_id: i64,
    pub shop_id: i64,
    pub quantity: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl JsonApiResource for Stock {
    const TYPE: &'static str = "stocks";

    fn id(&self) -> i64 {
        self.id
    }

    fn relationships(&self) -> Option<serde_json::Value> {
        Some(json!({
            "book": { "data": identifier("books", self.book_id) },
            "shop": { "data": identifier("shops", self.shop_id) },
        }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Sale {
    #[serde(skip_serializing)]
    pub id: i64,
    pub book_id: i64,
    pub shop_id: i64,
    pub quantity: i64,
    pub sold_at: String,
}

impl JsonApiResource for Sale {
    const TYPE: &'static str = "sales";

    fn id(&self) -> i64 {
        self.id
    }

    fn relationships(&self) -> Option<serde_json::Value> {
        Some(json!({
            "book": { "data": identifier("books", self.book_id) },
            "shop": { "data": identifier("shops", self.shop_id) },
        }))
    }
}

/// Body of both stock updates and sales: a book and a number of copies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantityForm {
    pub book_id: Option<i64>,
    pub quantity: Option<i64>,
}

impl QuantityForm {
    pub fn assign(&mut self, attrs: &Attributes, errors: &mut ValidationErrors) {
        if let Some(v) = attrs.integer("book_id", errors) {
            self.book_id = v;
        }
        if let Some(v) = attrs.integer("quantity", errors) {
            self.quantity = v;
        }
    }

    /// `minimum` is 0 for stock levels and 1 for sales.
    pub fn validate(&self, minimum: i64, errors: &mut ValidationErrors) {
        require_present(errors, "book", self.book_id.is_some() || errors.has("book_id"));
        match self.quantity {
            None => require_present(errors, "quantity", false),
            Some(q) if q < minimum => errors.add("quantity", format!("must be greater than or equal to {minimum}")),
            Some(_) => {}
        }
    }
}

pub struct Retail<'a> {
    db: &'a Database,
}

impl<'a> Retail<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn book_missing(&self, form: &QuantityForm) -> Result<ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(book_id) = form.book_id {
            if !self.db.exists("books", book_id).await? {
                errors.add("book", "must exist");
            }
        }
        Ok(errors)
    }

    pub async fn list_stocks(&self, shop_id: i64, page: &Page) -> Result<(Vec<Stock>, i64)> {
        let query = r#"
            SELECT id, book_id, shop_id, quantity, created_at, updated_at
            FROM stocks
            WHERE shop_id = ?
            ORDER BY book_id ASC
            LIMIT ? OFFSET ?
        "#;

        let mut rows = self
            .db
            .connection()
            .query(query, libsql::params![shop_id, page.limit as i64, page.offset as i64])
            .await?;
        let mut stocks = Vec::new();
        while let Some(row) = rows.next().await? {
            stocks.push(row_to_stock(&row)?);
        }

        let total = self
            .db
            .count("SELECT COUNT(*) FROM stocks WHERE shop_id = ?", vec![Value::Integer(shop_id)])
            .await?;
        Ok((stocks, total))
    }

    /// Sets the number of copies a shop holds, creating the stock row on
    /// first use.
    pub async fn set_stock(&self, shop_id: i64, book_id: i64, quantity: i64) -> Result<Stock> {
        let query = format!(
            "INSERT INTO stocks (shop_id, book_id, quantity) VALUES (?, ?, ?)
             ON CONFLICT (shop_id, book_id) DO UPDATE SET quantity = excluded.quantity, updated_at = {NOW}
             RETURNING id, book_id, shop_id, quantity, created_at, updated_at"
        );

        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![shop_id, book_id, quantity])
            .await?;

        if let Some(row) = rows.next().await? {
            row_to_stock(&row)
        } else {
            anyhow::bail!("Failed to set stock")
        }
    }

    pub async fn list_sales(&self, shop_id: i64, page: &Page) -> Result<(Vec<Sale>, i64)> {
        let query = r#"
            SELECT id, book_id, shop_id, quantity, sold_at
            FROM sales
            WHERE shop_id = ?
            ORDER BY sold_at DESC, id DESC
            LIMIT ? OFFSET ?
        "#;

        let mut rows = self
            .db
            .connection()
            .query(query, libsql::params![shop_id, page.limit as i64, page.offset as i64])
            .await?;
        let mut sales = Vec::new();
        while let Some(row) = rows.next().await? {
            sales.push(row_to_sale(&row)?);
        }

        let total = self
            .db
            .count("SELECT COUNT(*) FROM sales WHERE shop_id = ?", vec![Value::Integer(shop_id)])
            .await?;
        Ok((sales, total))
    }

    /// Takes `quantity` copies out of the shop's stock and records the sale.
    /// The inner `Err` carries the validation failure when stock runs short;
    /// nothing is written in that case.
    pub async fn sell(&self, shop_id: i64, book_id: i64, quantity: i64) -> Result<Result<Sale, ValidationErrors>> {
        let _guard = self.db.lock().await;
        self.db.begin().await?;

        let result = self.sell_internal(shop_id, book_id, quantity).await;
        self.db.finish(result).await
    }

    async fn sell_internal(&self, shop_id: i64, book_id: i64, quantity: i64) -> Result<Result<Sale, ValidationErrors>> {
        let conn = self.db.connection();

        let update = format!(
            "UPDATE stocks SET quantity = quantity - ?, updated_at = {NOW}
             WHERE shop_id = ? AND book_id = ? AND quantity >= ?"
        );
        let changed = conn
            .execute(&update, libsql::params![quantity, shop_id, book_id, quantity])
            .await?;

        // no rows touched; the caller commits an empty transaction
        if changed == 0 {
            let mut errors = ValidationErrors::new();
            errors.add("quantity", "exceeds the copies in stock");
            return Ok(Err(errors));
        }

        let mut rows = conn
            .query(
                "INSERT INTO sales (shop_id, book_id, quantity) VALUES (?, ?, ?)
                 RETURNING id, book_id, shop_id, quantity, sold_at",
                libsql::params![shop_id, book_id, quantity],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Ok(row_to_sale(&row)?)),
            None => anyhow::bail!("Failed to record sale"),
        }
    }
}

fn row_to_stock(row: &libsql::Row) -> Result<Stock> {
    Ok(Stock {
        id: row.get(0)?,
        book_id: row.get(1)?,
        shop_id: row.get(2)?,
        quantity: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_sale(row: &libsql::Row) -> Result<Sale> {
    Ok(Sale {
        id: row.get(0)?,
        book_id: row.get(1)?,
        shop_id: row.get(2)?,
        quantity: row.get(3)?,
        sold_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BookForm, Catalog, NamedForm, PublisherKind, ShopKind};

    async fn stock_quantity(db: &Database, shop_id: i64, book_id: i64) -> i64 {
        let mut rows = db
            .connection()
            .query(
                "SELECT quantity FROM stocks WHERE shop_id = ? AND book_id = ?",
                libsql::params![shop_id, book_id],
            )
            .await
            .unwrap();
        match rows.next().await.unwrap() {
            Some(row) => row.get(0).unwrap(),
            None => 0,
        }
    }

    async fn seed(db: &Database) -> (i64, i64) {
        let catalog = Catalog::new(db);
        let publisher = catalog
            .create_named::<PublisherKind>(&NamedForm {
                name: Some("Tor".to_string()),
            })
            .await
            .unwrap();
        let shop = catalog
            .create_named::<ShopKind>(&NamedForm {
                name: Some("Corner Books".to_string()),
            })
            .await
            .unwrap();
        let book = catalog
            .create_book(&BookForm {
                title: Some("Elantris".to_string()),
                pages_count: Some(496),
                published_at: Some("2005-04-21".to_string()),
                publisher_id: Some(publisher.id),
                ..Default::default()
            })
            .await
            .unwrap();
        (shop.id, book.id)
    }

    #[test]
    fn sales_need_at_least_one_copy() {
        let form = QuantityForm {
            book_id: Some(1),
            quantity: Some(0),
        };

        let mut errors = ValidationErrors::new();
        form.validate(1, &mut errors);
        assert_eq!(errors.on("quantity"), ["must be greater than or equal to 1"]);

        let mut errors = ValidationErrors::new();
        form.validate(0, &mut errors);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn upserts_stock_levels() {
        let db = Database::in_memory().await.unwrap();
        let (shop_id, book_id) = seed(&db).await;
        let retail = Retail::new(&db);

        let first = retail.set_stock(shop_id, book_id, 5).await.unwrap();
        let second = retail.set_stock(shop_id, book_id, 8).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(stock_quantity(&db, shop_id, book_id).await, 8);
    }

    #[tokio::test]
    async fn selling_decrements_stock() {
        let db = Database::in_memory().await.unwrap();
        let (shop_id, book_id) = seed(&db).await;
        let retail = Retail::new(&db);
        retail.set_stock(shop_id, book_id, 3).await.unwrap();

        let sale = retail.sell(shop_id, book_id, 2).await.unwrap().unwrap();
        assert_eq!(sale.quantity, 2);
        assert_eq!(stock_quantity(&db, shop_id, book_id).await, 1);

        let page = Page { page: 1, limit: 10, offset: 0 };
        let (sales, total) = retail.list_sales(shop_id, &page).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(sales[0].id, sale.id);
    }

    #[tokio::test]
    async fn refuses_to_oversell() {
        let db = Database::in_memory().await.unwrap();
        let (shop_id, book_id) = seed(&db).await;
        let retail = Retail::new(&db);
        retail.set_stock(shop_id, book_id, 1).await.unwrap();

        let errors = retail.sell(shop_id, book_id, 2).await.unwrap().unwrap_err();
        assert!(errors.has("quantity"));
        assert_eq!(stock_quantity(&db, shop_id, book_id).await, 1);

        let sales = db.count("SELECT COUNT(*) FROM sales", vec![]).await.unwrap();
        assert_eq!(sales, 0);
    }
}
