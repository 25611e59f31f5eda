use axum::{
    extract::{Extension, Path},
    Json,
};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::Product;
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ProductPayload {
    pub name: String,
    pub price: f64,
    pub image: String,
}

impl ProductPayload {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() || self.image.trim().is_empty() || self.price <= 0.0 {
            return Err(ApiError::BadRequest(
                "Please provide all fields".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct ProductResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

fn products(db: &Database) -> Collection<Product> {
    db.collection::<Product>(Product::COLLECTION)
}

fn parse_object_id(id: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id)
        .map_err(|_| ApiError::NotFound(format!("Product not found with id {}", id)))
}

pub async fn list_products(
    Extension(db): Extension<Database>,
) -> Result<Json<ProductResponse<Vec<Product>>>, ApiError> {
    let items: Vec<Product> = products(&db).find(doc! {}).await?.try_collect().await?;

    Ok(Json(ProductResponse {
        success: true,
        data: items,
    }))
}

pub async fn create_product(
    Extension(db): Extension<Database>,
    Json(payload): Json<ProductPayload>,
) -> Result<Json<ProductResponse<Product>>, ApiError> {
    payload.validate()?;

    let mut product = Product {
        id: None,
        name: payload.name,
        price: payload.price,
        image: payload.image,
        created_at: Utc::now(),
    };

    let inserted = products(&db).insert_one(&product).await?;
    product.id = inserted.inserted_id.as_object_id();

    info!("Created product: {}", product.name);

    Ok(Json(ProductResponse {
        success: true,
        data: product,
    }))
}

pub async fn update_product(
    Extension(db): Extension<Database>,
    Path(id): Path<String>,
    Json(payload): Json<ProductPayload>,
) -> Result<Json<ProductResponse<Product>>, ApiError> {
    payload.validate()?;
    let object_id = parse_object_id(&id)?;

    let updated = products(&db)
        .find_one_and_update(
            doc! { "_id": object_id },
            doc! { "$set": {
                "name": &payload.name,
                "price": payload.price,
                "image": &payload.image,
            }},
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product not found with id {}", id)))?;

    Ok(Json(ProductResponse {
        success: true,
        data: updated,
    }))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

pub async fn delete_product(
    Extension(db): Extension<Database>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let object_id = parse_object_id(&id)?;

    let result = products(&db).delete_one(doc! { "_id": object_id }).await?;
    if result.deleted_count == 0 {
        return Err(ApiError::NotFound(format!(
            "Product not found with id {}",
            id
        )));
    }

    info!("Deleted product {}", id);

    Ok(Json(DeleteResponse {
        success: true,
        message: "Product deleted".to_string(),
    }))
}
