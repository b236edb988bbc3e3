//! Checkout creation
//!
//! Prices the plan (with an optional coupon), reserves the PENDING order and
//! asks the provider for a hosted checkout. A provider failure discards the
//! reservation, so nothing is left behind.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::config::{MIDTRANS_MIN_AMOUNT_IDR, XENDIT_MIN_AMOUNT_IDR};
use crate::coupons::CouponStore;
use crate::error::{BillingError, BillingResult};
use crate::money::Idr;
use crate::orders::{generate_order_id, Gateway, PaymentLog};
use crate::plan::Plan;
use crate::providers::{CheckoutRequest, CheckoutSession, PaymentGateway, PaypalClient, PaypalOrder};
use crate::store::BillingStore;

/// Body of a hosted checkout request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutInput {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// Body of a PayPal order request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaypalInput {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A created hosted checkout and its PENDING order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOrder {
    pub order: PaymentLog,
    pub session: CheckoutSession,
}

fn parse_plan(raw: Option<&str>) -> BillingResult<Plan> {
    let raw = raw.map(str::trim).filter(|p| !p.is_empty()).ok_or(BillingError::MissingFields)?;
    Plan::parse(raw).ok_or_else(|| BillingError::InvalidPayload(format!("unknown plan '{}'", raw)))
}

fn minimum_amount(gateway: Gateway) -> Idr {
    match gateway {
        Gateway::Invoice => Idr(XENDIT_MIN_AMOUNT_IDR),
        Gateway::Snap => Idr(MIDTRANS_MIN_AMOUNT_IDR),
    }
}

pub struct CheckoutService {
    store: Arc<dyn BillingStore>,
    coupons: Arc<CouponStore>,
    invoice: Arc<dyn PaymentGateway>,
    snap: Arc<dyn PaymentGateway>,
    paypal: Arc<PaypalClient>,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn BillingStore>,
        coupons: Arc<CouponStore>,
        invoice: Arc<dyn PaymentGateway>,
        snap: Arc<dyn PaymentGateway>,
        paypal: Arc<PaypalClient>,
    ) -> Self {
        Self {
            store,
            coupons,
            invoice,
            snap,
            paypal,
        }
    }

    pub fn gateway(&self, gateway: Gateway) -> &dyn PaymentGateway {
        match gateway {
            Gateway::Invoice => self.invoice.as_ref(),
            Gateway::Snap => self.snap.as_ref(),
        }
    }

    /// Create a hosted checkout on `gateway` for the authenticated `requester`.
    ///
    /// The order belongs to the account registered under `email` when there
    /// is one, otherwise to the requester.
    pub async fn create(
        &self,
        gateway: Gateway,
        requester: Uuid,
        input: &CheckoutInput,
    ) -> BillingResult<CheckoutOrder> {
        let plan = parse_plan(input.plan.as_deref())?;
        let email = input
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(BillingError::MissingFields)?;

        let user_id = match self.store.find_user_by_email(email).await? {
            Some(user) => user.id,
            None => requester,
        };

        let quote = self
            .coupons
            .price_idr(user_id, plan, input.coupon_code.as_deref())
            .await?;

        let minimum = minimum_amount(gateway);
        if quote.amount < minimum {
            tracing::info!(
                plan = %plan,
                amount = quote.amount.0,
                minimum = minimum.0,
                "Checkout amount below provider minimum"
            );
            return Err(BillingError::InvalidAmount(format!(
                "{} is below the {} minimum of {}",
                quote.amount,
                gateway.display_name(),
                minimum
            )));
        }

        let order_id = generate_order_id(gateway, plan);
        let request = CheckoutRequest {
            order_id: order_id.clone(),
            amount: quote.amount,
            email: email.to_string(),
            description: format!("Subscription Plan: {}", plan),
        };

        // Reserved before the provider call; an order holding the coupon blocks this one
        let order = PaymentLog::pending(order_id, user_id, Some(plan), quote.amount, quote.coupon_code);
        if !self.store.insert_checkout_order(&order).await? {
            tracing::warn!(
                user_id = %user_id,
                coupon_code = ?order.coupon_code,
                "Checkout rejected: coupon already held by an open or paid order"
            );
            return Err(BillingError::AlreadyUsed);
        }

        let session = match self.gateway(gateway).create_checkout(&request).await {
            Ok(session) => session,
            Err(e) => {
                if let Err(discard) = self.store.discard_pending_order(&order.order_id).await {
                    tracing::error!(
                        order_id = %order.order_id,
                        error = %discard,
                        "Provider checkout failed and the reserved order could not be discarded"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            order_id = %order.order_id,
            user_id = %user_id,
            plan = %plan,
            amount = order.amount.0,
            coupon_code = ?order.coupon_code,
            "Checkout created"
        );

        Ok(CheckoutOrder { order, session })
    }

    /// Create a PayPal order at the discounted USD price. No order row is kept.
    pub async fn create_paypal(&self, requester: Uuid, input: &PaypalInput) -> BillingResult<PaypalOrder> {
        let plan = parse_plan(input.plan.as_deref())?;
        let amount = self
            .coupons
            .price_usd(requester, plan, input.coupon_code.as_deref())
            .await?;

        let currency = input.currency.as_deref().unwrap_or("USD");
        let description = input.description.as_deref().unwrap_or("Subscription");
        self.paypal.create_order(amount, currency, description).await
    }
}
