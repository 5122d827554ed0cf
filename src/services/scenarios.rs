// src/services/scenarios.rs

//! Cenários contra um Postgres de verdade: baixa, estorno e travas passando
//! pelos repositórios. Sem `DATABASE_URL` definida, cada teste é pulado.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{
    common::error::AppError,
    config::AppState,
    db::finance_repo::CardOperatorFields,
    models::{
        finance::{CashBookEntry, CashBookOrigin, PaymentMethod, PaymentStatus},
        service_order::OsStatus,
    },
    services::{finance_service::PaymentRequest, order_service::ItemInput},
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn connect() -> anyhow::Result<Option<AppState>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL não definida; cenário com banco ignorado");
        return Ok(None);
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(Some(AppState::from_pool(pool)))
}

async fn stocked_part(state: &AppState, on_hand: Decimal) -> anyhow::Result<i64> {
    let part = state
        .inventory_service
        .create_part(&state.db_pool, "Pastilha de freio", None, on_hand, dec!(0), dec!(10), dec!(20))
        .await?;
    Ok(part.id)
}

// OS já com cliente e veículo, pronta para ir ao financeiro
async fn open_order(state: &AppState) -> anyhow::Result<i64> {
    let order = state
        .order_service
        .create_order(&state.db_pool, Some(1), Some(1), None, None)
        .await?;
    Ok(order.id)
}

/// (físico, reservado)
async fn stock_of(state: &AppState, part_id: i64) -> anyhow::Result<(Decimal, Decimal)> {
    let availability = state
        .inventory_service
        .check_availability(&state.db_pool, part_id)
        .await?;
    Ok((availability.on_hand, availability.reserved))
}

async fn entries(
    state: &AppState,
    os_id: i64,
    origin: CashBookOrigin,
) -> anyhow::Result<Vec<CashBookEntry>> {
    let entries = state.finance_service.list_cash_book(Some(os_id)).await?;
    Ok(entries.into_iter().filter(|e| e.origin == origin).collect())
}

fn linked(part_id: i64, quantity: Decimal) -> ItemInput {
    ItemInput {
        part_id: Some(part_id),
        quantity,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Ciclo completo: baixa, reenvio, trava, reabertura e cancelamento
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lifecycle_commits_and_restores_stock_exactly_once() -> anyhow::Result<()> {
    let Some(state) = connect().await? else {
        return Ok(());
    };
    let pool = &state.db_pool;
    let orders = &state.order_service;

    let part_id = stocked_part(&state, dec!(5)).await?;
    let os_id = open_order(&state).await?;

    let added = orders.add_item(pool, os_id, &linked(part_id, dec!(3))).await?;
    let item_id = added.item.item.id;
    orders.add_labor(pool, os_id, "Troca de pastilhas", dec!(60), None).await?;
    assert_eq!(stock_of(&state, part_id).await?, (dec!(5), dec!(3)));

    // --- FINANCEIRO: baixa 3 e congela 3 x 20 + 60 ---
    let order = orders.transition_status(pool, os_id, OsStatus::Financeiro).await?;
    assert_eq!(order.status, OsStatus::Financeiro);
    assert_eq!(order.client_total, Some(dec!(120)));
    assert_eq!(stock_of(&state, part_id).await?, (dec!(2), dec!(0)));

    // --- Reenvio da mesma transição não baixa de novo ---
    orders.transition_status(pool, os_id, OsStatus::Financeiro).await?;
    assert_eq!(stock_of(&state, part_id).await?, (dec!(2), dec!(0)));
    assert_eq!(entries(&state, os_id, CashBookOrigin::FechamentoOs).await?.len(), 1);

    // --- FINALIZADA: itens travados, nada muda ---
    let delivered = orders.transition_status(pool, os_id, OsStatus::Finalizada).await?;
    assert!(delivered.delivered_at.is_some());

    let edit = orders.update_item(pool, item_id, &linked(part_id, dec!(1))).await;
    assert!(matches!(edit, Err(AppError::Locked(OsStatus::Finalizada))));
    let removal = orders.delete_item(pool, item_id).await;
    assert!(matches!(removal, Err(AppError::Locked(OsStatus::Finalizada))));

    let detail = orders.get_detail(pool, os_id).await?;
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].item.quantity, dec!(3));
    assert_eq!(stock_of(&state, part_id).await?, (dec!(2), dec!(0)));

    // --- Reabertura: estorna o fechamento, estoque continua baixado ---
    let reopened = orders.transition_status(pool, os_id, OsStatus::Aberta).await?;
    assert_eq!(reopened.client_total, None);
    assert!(reopened.delivered_at.is_none());

    let closures = entries(&state, os_id, CashBookOrigin::FechamentoOs).await?;
    assert_eq!(closures.len(), 1);
    assert!(closures[0].reversed_at.is_some());
    let reversals = entries(&state, os_id, CashBookOrigin::EstornoFechamentoOs).await?;
    assert_eq!(reversals.len(), 1);
    assert_eq!(reversals[0].amount, dec!(-120));
    assert_eq!(stock_of(&state, part_id).await?, (dec!(2), dec!(0)));

    // --- Cancelamento devolve exatamente o que foi baixado ---
    orders.transition_status(pool, os_id, OsStatus::Cancelada).await?;
    assert_eq!(stock_of(&state, part_id).await?, (dec!(5), dec!(0)));

    orders.transition_status(pool, os_id, OsStatus::Cancelada).await?;
    assert_eq!(stock_of(&state, part_id).await?, (dec!(5), dec!(0)));

    Ok(())
}

#[tokio::test]
async fn item_reduced_after_reopen_returns_the_difference() -> anyhow::Result<()> {
    let Some(state) = connect().await? else {
        return Ok(());
    };
    let pool = &state.db_pool;
    let orders = &state.order_service;

    let part_id = stocked_part(&state, dec!(10)).await?;
    let os_id = open_order(&state).await?;
    let added = orders.add_item(pool, os_id, &linked(part_id, dec!(4))).await?;

    orders.transition_status(pool, os_id, OsStatus::Financeiro).await?;
    assert_eq!(stock_of(&state, part_id).await?, (dec!(6), dec!(0)));

    orders.transition_status(pool, os_id, OsStatus::Aberta).await?;
    orders.update_item(pool, added.item.item.id, &linked(part_id, dec!(1))).await?;
    assert_eq!(stock_of(&state, part_id).await?, (dec!(6), dec!(0)));

    orders.transition_status(pool, os_id, OsStatus::Financeiro).await?;
    assert_eq!(stock_of(&state, part_id).await?, (dec!(9), dec!(0)));

    Ok(())
}

// ---------------------------------------------------------------------------
// Falha no meio da transição desfaz tudo
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_transition_leaves_order_and_stock_untouched() -> anyhow::Result<()> {
    let Some(state) = connect().await? else {
        return Ok(());
    };
    let pool = &state.db_pool;
    let orders = &state.order_service;

    let part_id = stocked_part(&state, dec!(5)).await?;
    let os_id = open_order(&state).await?;
    orders.add_item(pool, os_id, &linked(part_id, dec!(2))).await?;

    // O lançamento de fechamento é o último efeito: baixa e snapshot já rodaram
    let guard = format!("reject_closure_os_{os_id}");
    sqlx::query(&format!(
        r#"
        CREATE FUNCTION {guard}() RETURNS trigger AS $$
        BEGIN
            IF NEW.os_id = {os_id} THEN
                RAISE EXCEPTION 'lançamento recusado';
            END IF;
            RETURN NEW;
        END
        $$ LANGUAGE plpgsql
        "#
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE TRIGGER {guard} BEFORE INSERT ON cash_book_entries FOR EACH ROW EXECUTE FUNCTION {guard}()"
    ))
    .execute(pool)
    .await?;

    let result = orders.transition_status(pool, os_id, OsStatus::Financeiro).await;

    sqlx::query(&format!("DROP TRIGGER {guard} ON cash_book_entries"))
        .execute(pool)
        .await?;
    sqlx::query(&format!("DROP FUNCTION {guard}()")).execute(pool).await?;

    assert!(matches!(result, Err(AppError::TransitionFailed(_))));

    let header = orders.get_detail(pool, os_id).await?.header;
    assert_eq!(header.status, OsStatus::Aberta);
    assert_eq!(header.parts_total, None);
    assert_eq!(header.client_total, None);
    assert_eq!(stock_of(&state, part_id).await?, (dec!(5), dec!(2)));
    assert!(entries(&state, os_id, CashBookOrigin::FechamentoOs).await?.is_empty());

    // Sem o gatilho a mesma transição passa normalmente
    orders.transition_status(pool, os_id, OsStatus::Financeiro).await?;
    assert_eq!(stock_of(&state, part_id).await?, (dec!(3), dec!(0)));

    Ok(())
}

// ---------------------------------------------------------------------------
// Pagamentos e operadoras
// ---------------------------------------------------------------------------

#[tokio::test]
async fn payment_reversal_is_idempotent_and_compensates() -> anyhow::Result<()> {
    let Some(state) = connect().await? else {
        return Ok(());
    };
    let pool = &state.db_pool;
    let finance = &state.finance_service;

    let os_id = open_order(&state).await?;
    let request = PaymentRequest {
        amount: dec!(80),
        method: PaymentMethod::Pix,
        installments: 1,
        operator_id: None,
        paid_on: Utc::now().date_naive(),
    };
    let receipt = finance.register_payment(pool, os_id, &request).await?;
    assert_eq!(receipt.payment.status, PaymentStatus::Recebido);

    let reversed = finance.reverse_payment(pool, receipt.payment.id).await?;
    assert_eq!(reversed.status, PaymentStatus::Estornado);
    let again = finance.reverse_payment(pool, receipt.payment.id).await?;
    assert_eq!(again.status, PaymentStatus::Estornado);

    let payments = entries(&state, os_id, CashBookOrigin::PagamentoCliente).await?;
    assert_eq!(payments.len(), 1);
    assert!(payments[0].reversed_at.is_some());
    let compensations = entries(&state, os_id, CashBookOrigin::EstornoPagamento).await?;
    assert_eq!(compensations.len(), 1);
    assert_eq!(compensations[0].amount, dec!(-80));

    assert_eq!(finance.get_totals(pool, os_id).await?.paid, Decimal::ZERO);
    assert!(matches!(
        finance.reverse_payment(pool, -1).await,
        Err(AppError::ResourceNotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn rejected_operator_is_never_written() -> anyhow::Result<()> {
    let Some(state) = connect().await? else {
        return Ok(());
    };
    let finance = &state.finance_service;

    let name = format!("Adquirente {}", Utc::now().timestamp_micros());
    let fields = CardOperatorFields {
        name: &name,
        debit_rate: None,
        debit_days: None,
        credit_rate: Some(dec!(70)),
        credit_days: Some(30),
        installment_rate: None,
        installment_days: None,
        anticipation_rate: dec!(40),
        auto_anticipation: true,
        active: true,
    };

    let result = finance.create_operator(&state.db_pool, &fields, &[]).await;
    assert!(matches!(result, Err(AppError::InvalidOperatorConfig(_))));

    let operators = finance.list_operators().await?;
    assert!(operators.iter().all(|o| o.operator.name != name));

    Ok(())
}
