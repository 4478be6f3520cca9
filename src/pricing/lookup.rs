// Product and customer lookup
// Turns a reference-only quote into a fully specified pricing request

use async_trait::async_trait;

use crate::models::{Customer, PricingRequest, Product, QuoteRequest};
use crate::pricing::error::{PRResult, PricingError, StoreError};

/// Read access to product and customer master data
#[async_trait]
pub trait ProductDirectory: Send + Sync {
    async fn product(&self, id: &str) -> Result<Option<Product>, StoreError>;

    async fn customer(&self, id: &str) -> Result<Option<Customer>, StoreError>;
}

/// Resolve a quote into a pricing request
///
/// The market comes from the quote when given, otherwise from the customer.
pub async fn resolve_quote(
    directory: &dyn ProductDirectory,
    quote: &QuoteRequest,
) -> PRResult<PricingRequest> {
    let product = directory
        .product(&quote.product_id)
        .await?
        .ok_or_else(|| PricingError::ProductNotFound(quote.product_id.clone()))?;

    let customer = match quote.customer_id.as_deref() {
        Some(id) => Some(
            directory
                .customer(id)
                .await?
                .ok_or_else(|| PricingError::CustomerNotFound(id.to_string()))?,
        ),
        None => None,
    };

    let market = quote
        .market
        .clone()
        .or_else(|| customer.as_ref().map(|c| c.market.clone()))
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| {
            PricingError::InvalidRequest("market is required for anonymous quotes".to_string())
        })?;

    Ok(PricingRequest {
        product_id: product.id,
        customer_id: customer.as_ref().map(|c| c.id.clone()),
        customer_tier: customer.as_ref().and_then(|c| c.tier),
        market,
        quantity: quote.quantity,
        base_price: product.base_price,
        product_category: product.category,
        product_brand: product.brand,
        evaluation_time: quote.evaluation_time,
        thc_percentage: product.thc_percentage,
        expiration_date: product.expiration_date,
        promo_code: quote.promo_code.clone(),
        order_lines: quote.order_lines.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::memory::MemoryDirectory;
    use crate::pricing::types::CustomerTier;
    use rust_decimal_macros::dec;

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new(
            vec![Product {
                id: "og-kush-1g".into(),
                name: "OG Kush 1g".into(),
                category: "flower".into(),
                brand: "acme".into(),
                base_price: dec!(12.00),
                thc_percentage: Some(dec!(24.1)),
                expiration_date: None,
            }],
            vec![Customer {
                id: "cust-1".into(),
                tier: Some(CustomerTier::A),
                market: "CO".into(),
            }],
        )
    }

    fn quote(product_id: &str, customer_id: Option<&str>) -> QuoteRequest {
        QuoteRequest {
            product_id: product_id.into(),
            customer_id: customer_id.map(str::to_string),
            market: None,
            quantity: 3,
            promo_code: None,
            evaluation_time: None,
            order_lines: vec![],
        }
    }

    #[tokio::test]
    async fn test_resolves_product_and_customer() {
        let request = resolve_quote(&directory(), &quote("og-kush-1g", Some("cust-1")))
            .await
            .unwrap();
        assert_eq!(request.base_price, dec!(12.00));
        assert_eq!(request.product_category, "flower");
        assert_eq!(request.customer_tier, Some(CustomerTier::A));
        assert_eq!(request.market, "CO");
        assert_eq!(request.thc_percentage, Some(dec!(24.1)));
    }

    #[tokio::test]
    async fn test_unknown_references() {
        let err = resolve_quote(&directory(), &quote("missing", None)).await.unwrap_err();
        assert!(matches!(err, PricingError::ProductNotFound(_)));

        let err = resolve_quote(&directory(), &quote("og-kush-1g", Some("nobody")))
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::CustomerNotFound(_)));
    }

    #[tokio::test]
    async fn test_anonymous_quote_needs_market() {
        let err = resolve_quote(&directory(), &quote("og-kush-1g", None)).await.unwrap_err();
        assert!(matches!(err, PricingError::InvalidRequest(_)));

        let mut q = quote("og-kush-1g", None);
        q.market = Some("MI".into());
        let request = resolve_quote(&directory(), &q).await.unwrap();
        assert_eq!(request.market, "MI");
        assert_eq!(request.customer_tier, None);
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_data_unavailable() {
        let dir = directory();
        dir.set_unavailable(true);
        let err = resolve_quote(&dir, &quote("og-kush-1g", None)).await.unwrap_err();
        assert!(matches!(err, PricingError::DataUnavailable(_)));
    }
}
