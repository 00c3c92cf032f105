use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use souk_core::domain::product::{Product, ProductId, ProductKind};
use souk_core::domain::seller::{SellerProfile, VerificationTier};
use souk_core::domain::UserId;

use super::{parse_enum, parse_u32, RepositoryError};

pub(crate) async fn fetch_product(
    conn: &mut SqliteConnection,
    id: &ProductId,
) -> Result<Option<Product>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, seller_id, name, kind, active, stock_quantity FROM product WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(product_from_row).transpose()
}

pub(crate) async fn upsert_product(
    conn: &mut SqliteConnection,
    product: &Product,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO product (id, seller_id, name, kind, active, stock_quantity)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            seller_id = excluded.seller_id,
            name = excluded.name,
            kind = excluded.kind,
            active = excluded.active,
            stock_quantity = excluded.stock_quantity",
    )
    .bind(&product.id.0)
    .bind(&product.seller_id.0)
    .bind(&product.name)
    .bind(product.kind.as_str())
    .bind(product.active)
    .bind(i64::from(product.stock_quantity))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn fetch_seller_profile(
    conn: &mut SqliteConnection,
    seller_id: &UserId,
) -> Result<Option<SellerProfile>, RepositoryError> {
    let row = sqlx::query(
        "SELECT seller_id, display_name, verification_tier FROM seller_profile WHERE seller_id = ?",
    )
    .bind(&seller_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| -> Result<SellerProfile, RepositoryError> {
        Ok(SellerProfile {
            seller_id: UserId(row.try_get("seller_id")?),
            display_name: row.try_get("display_name")?,
            verification_tier: parse_enum(
                "verification_tier",
                row.try_get("verification_tier")?,
                VerificationTier::parse,
            )?,
        })
    })
    .transpose()
}

pub(crate) async fn upsert_seller_profile(
    conn: &mut SqliteConnection,
    profile: &SellerProfile,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO seller_profile (seller_id, display_name, verification_tier)
         VALUES (?, ?, ?)
         ON CONFLICT(seller_id) DO UPDATE SET
            display_name = excluded.display_name,
            verification_tier = excluded.verification_tier",
    )
    .bind(&profile.seller_id.0)
    .bind(&profile.display_name)
    .bind(profile.verification_tier.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn product_from_row(row: SqliteRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: ProductId(row.try_get("id")?),
        seller_id: UserId(row.try_get("seller_id")?),
        name: row.try_get("name")?,
        kind: parse_enum("kind", row.try_get("kind")?, ProductKind::parse)?,
        active: row.try_get("active")?,
        stock_quantity: parse_u32("stock_quantity", row.try_get("stock_quantity")?)?,
    })
}
