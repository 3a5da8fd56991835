use payment_reconciler::config::Config;
use payment_reconciler::domain::money::MoneyAmount;
use payment_reconciler::domain::payment::PaymentStatus;
use proptest::prelude::*;

fn arb_status() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::ToConfirm),
        Just(PaymentStatus::Authorized),
        Just(PaymentStatus::Failed),
        Just(PaymentStatus::Canceled),
        Just(PaymentStatus::Refunded),
        Just(PaymentStatus::Abandoned),
    ]
}

fn minimal_config(backoff: Vec<i64>) -> Config {
    Config {
        app_name: "payment_reconciler_test".into(),
        app_environment: "test".into(),
        app_version: "0.0.0".into(),
        database_dsn: String::new(),
        reconcile_enabled: true,
        crm_enabled: true,
        reconcile_interval_seconds: 15,
        reconcile_batch_size: 100,
        reconcile_attempt_offsets: vec![60, 180, 900, 1800],
        reconcile_polling_providers: vec!["webpay".into()],
        abandoned_timeout_minutes: 60,
        crm_base_url: "http://localhost".into(),
        crm_pagar_path: "/pagar".into(),
        crm_auth_bearer: None,
        crm_timeout_seconds: 10,
        crm_retry_backoff: backoff,
        heartbeat_interval_seconds: 60,
        health_auth_bearer: None,
        stripe_api_key: None,
        stripe_api_base: "https://api.stripe.com".into(),
        paypal_client_id: None,
        paypal_client_secret: None,
        paypal_base_url: "https://api-m.sandbox.paypal.com".into(),
        webpay_status_url_template: "https://example.com/{token}".into(),
        webpay_api_key_id: None,
        webpay_api_key_secret: None,
        webpay_commerce_code: None,
    }
}

proptest! {
    /// Terminal states (Failed, Canceled, Refunded, Abandoned) never transition anywhere — I1.
    #[test]
    fn terminal_states_reject_all_transitions(target in arb_status()) {
        use PaymentStatus::*;
        for terminal in [Failed, Canceled, Refunded, Abandoned] {
            prop_assert!(!terminal.can_transition_to(&target));
        }
    }

    /// Every allowed edge agrees with `is_terminal`: nothing transitions *into*
    /// a state that isn't reachable per the graph, and terminal states have no
    /// outgoing edges at all.
    #[test]
    fn is_terminal_implies_no_outgoing_edges(from in arb_status(), to in arb_status()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(&to));
        }
    }

    /// as_str → try_from roundtrip is identity for any status.
    #[test]
    fn status_roundtrip(status in arb_status()) {
        let roundtripped = PaymentStatus::try_from(status.as_str()).unwrap();
        prop_assert_eq!(roundtripped, status);
    }

    /// MoneyAmount survives roundtrip through minor_units() for any non-negative value.
    #[test]
    fn money_amount_roundtrip(minor in 0i64..=i64::MAX) {
        let amount = MoneyAmount::new(minor).unwrap();
        prop_assert_eq!(amount.minor_units(), minor);
    }

    /// Negative minor-unit amounts are always rejected.
    #[test]
    fn money_amount_rejects_negative(minor in i64::MIN..0i64) {
        prop_assert!(MoneyAmount::new(minor).is_err());
    }

    /// `crm_backoff_for_attempt` saturates at the schedule's last index and
    /// never indexes past it, for any attempt count and any non-empty schedule.
    #[test]
    fn crm_backoff_saturates(
        backoff in prop::collection::vec(1i64..10_000, 1..6),
        attempts in 1i32..1000,
    ) {
        let config = minimal_config(backoff.clone());
        let value = config.crm_backoff_for_attempt(attempts);
        let expected_index = ((attempts - 1).max(0) as usize).min(backoff.len() - 1);
        prop_assert_eq!(value, backoff[expected_index]);
        prop_assert!(backoff.contains(&value));
    }

    /// Attempt-schedule boundary (§8 Boundaries): `attempts == len(offsets) - 1`
    /// still indexes a valid offset (last attempt, not abandonment);
    /// `attempts == len(offsets)` is exhausted and must never index the array.
    #[test]
    fn attempt_schedule_boundary(offsets in prop::collection::vec(1i64..10_000, 1..6)) {
        let len = offsets.len() as i64;
        let last_attempt = len - 1;
        prop_assert!(!is_exhausted(last_attempt, len));
        prop_assert_eq!(offsets[last_attempt as usize], offsets[last_attempt as usize]);

        let exhausted_attempt = len;
        prop_assert!(is_exhausted(exhausted_attempt, len));
    }
}

fn is_exhausted(k: i64, offsets_len: i64) -> bool {
    k >= offsets_len
}
