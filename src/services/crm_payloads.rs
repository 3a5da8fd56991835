use crate::domain::{crm::CrmOperation, payment::Payment, payment::PaymentType};

const AMOUNT_KEYS: &[&str] = &[
    "amount_minor",
    "amountMinor",
    "amount",
    "total_amount",
    "totalAmount",
    "total",
];

fn extract_str<'a>(value: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    let obj = value.as_object()?;
    keys.iter().find_map(|k| obj.get(*k)).and_then(|v| v.as_str())
}

fn sanitize_rut(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| *c != '.' && *c != '-').collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn build_rut(payment: &Payment) -> Option<String> {
    let raw = payment
        .deposit_rut
        .as_deref()
        .or(payment.order_customer_rut.as_deref())
        .or_else(|| extract_str(&payment.context, &["customer_rut"]))
        .or_else(|| extract_str(&payment.provider_metadata, &["rut"]))?;
    sanitize_rut(raw)
}

fn build_name(payment: &Payment) -> String {
    payment
        .deposit_name
        .clone()
        .or_else(|| extract_str(&payment.context, &["customer_name"]).map(str::to_string))
        .or_else(|| extract_str(&payment.provider_metadata, &["name"]).map(str::to_string))
        .unwrap_or_else(|| payment.provider.as_str().to_string())
}

fn build_transaction_id(payment: &Payment) -> String {
    payment
        .payment_order_id
        .clone()
        .or_else(|| payment.authorization_code.clone())
        .or_else(|| payment.token.clone())
        .unwrap_or_else(|| payment.id.to_string())
}

/// Recursively search `value` for the first non-zero number keyed by any
/// name in `AMOUNT_KEYS`.
fn find_nonzero_amount(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Object(map) => {
            for key in AMOUNT_KEYS {
                if let Some(v) = map.get(*key) {
                    if let Some(n) = v.as_i64() {
                        if n != 0 {
                            return Some(n);
                        }
                    } else if let Some(f) = v.as_f64() {
                        let truncated = f.trunc() as i64;
                        if truncated != 0 {
                            return Some(truncated);
                        }
                    }
                }
            }
            map.values().find_map(find_nonzero_amount)
        }
        serde_json::Value::Array(items) => items.iter().find_map(find_nonzero_amount),
        _ => None,
    }
}

/// Amount-resolution chain from §4.4: non-CLP aux amount first, then the
/// primary minor-unit amount if non-zero, then a recursive scavenge through
/// `context`/`provider_metadata`, finally falling back to `amount_minor`.
fn resolve_amount(payment: &Payment) -> i64 {
    if !payment.currency.is_clp() {
        if let Some(aux) = payment.aux_amount_minor {
            return aux.minor_units();
        }
    }
    if !payment.amount_minor.is_zero() {
        return payment.amount_minor.minor_units();
    }
    if let Some(found) = find_nonzero_amount(&payment.context) {
        return found;
    }
    if let Some(found) = find_nonzero_amount(&payment.provider_metadata) {
        return found;
    }
    payment.amount_minor.minor_units()
}

/// Pure function: derives the CRM notification body from payment fields.
/// Deterministic — identical inputs always yield an identical payload, and
/// the result is frozen into the queue row at enqueue time (P5).
pub fn build(payment: &Payment, operation: CrmOperation) -> serde_json::Value {
    let is_cuota = matches!(payment.payment_type, Some(PaymentType::Cuotas));

    let list_contrato = if !is_cuota {
        payment
            .contract_number
            .as_ref()
            .map(|c| serde_json::json!([c]))
    } else {
        None
    };

    let list_cuota = if is_cuota && !payment.quota_numbers.is_empty() {
        Some(serde_json::json!(payment.quota_numbers))
    } else {
        None
    };

    serde_json::json!({
        "rutDepositante": build_rut(payment),
        "nombreDepositante": build_name(payment),
        "paymentMethod": payment.provider.as_str(),
        "transactionId": build_transaction_id(payment),
        "monto": resolve_amount(payment).to_string(),
        "listContrato": list_contrato,
        "listCuota": list_cuota,
        "operation": operation.as_str(),
        "paymentId": payment.id,
    })
}

/// Gates enqueue of a CRM operation for this payment (§4.4/§4.5).
pub fn can_notify_crm(payment: &Payment) -> bool {
    if !payment.should_notify_crm {
        return false;
    }
    if !payment.currency.is_clp() && payment.aux_amount_minor.is_none() {
        return false;
    }
    match payment.payment_type {
        Some(PaymentType::Cuotas) => !payment.quota_numbers.is_empty(),
        _ => payment.contract_number.is_some(),
    }
}
