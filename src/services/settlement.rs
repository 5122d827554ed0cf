// src/services/settlement.rs

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;

use crate::{
    common::{error::AppError, money::round_money},
    db::finance_repo::CardOperatorFields,
    models::finance::{CardModality, CardOperator, InstallmentRate, Settlement},
};

pub const MAX_INSTALLMENTS: i32 = 18;
const MAX_RATE: Decimal = Decimal::ONE_HUNDRED;

/// Taxa e prazo resolvidos para uma modalidade/parcelamento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResolvedTerms {
    rate: Decimal,
    days: i32,
    anticipation_rate: Decimal,
}

fn require_rate(value: Option<Decimal>, field: &str) -> Result<Decimal, AppError> {
    let rate = value.ok_or_else(|| {
        AppError::InvalidOperatorConfig(format!("{} não configurada", field))
    })?;
    if rate.is_sign_negative() {
        return Err(AppError::InvalidOperatorConfig(format!("{} negativa", field)));
    }
    Ok(rate)
}

fn require_days(value: Option<i32>, field: &str) -> Result<i32, AppError> {
    let days = value.ok_or_else(|| {
        AppError::InvalidOperatorConfig(format!("{} não configurado", field))
    })?;
    if days < 0 {
        return Err(AppError::InvalidOperatorConfig(format!("{} negativo", field)));
    }
    Ok(days)
}

fn resolve_terms(
    operator: &CardOperator,
    overrides: &[InstallmentRate],
    modality: CardModality,
    installments: i32,
) -> Result<ResolvedTerms, AppError> {
    let default_anticipation = require_rate(Some(operator.anticipation_rate), "taxa de antecipação")?;

    match modality {
        CardModality::Debito => {
            if installments != 1 {
                return Err(AppError::InvalidPayment(
                    "débito não aceita parcelamento".into(),
                ));
            }
            Ok(ResolvedTerms {
                rate: require_rate(operator.debit_rate, "taxa de débito")?,
                days: require_days(operator.debit_days, "prazo de débito")?,
                anticipation_rate: Decimal::ZERO,
            })
        }
        CardModality::Credito if installments <= 1 => Ok(ResolvedTerms {
            rate: require_rate(operator.credit_rate, "taxa de crédito à vista")?,
            days: require_days(operator.credit_days, "prazo de crédito à vista")?,
            anticipation_rate: default_anticipation,
        }),
        CardModality::Credito => {
            // O prazo do parcelado não tem exceção por parcela.
            let days = require_days(operator.installment_days, "prazo de crédito parcelado")?;

            match overrides.iter().find(|o| o.installments == installments) {
                Some(o) => Ok(ResolvedTerms {
                    rate: require_rate(Some(o.total_rate), "taxa por parcela")?,
                    days,
                    anticipation_rate: match o.anticipation_rate {
                        Some(rate) => require_rate(Some(rate), "taxa de antecipação por parcela")?,
                        None => default_anticipation,
                    },
                }),
                None => Ok(ResolvedTerms {
                    rate: require_rate(operator.installment_rate, "taxa de crédito parcelado")?,
                    days,
                    anticipation_rate: default_anticipation,
                }),
            }
        }
    }
}

/// Calcula taxa, líquido e data de repasse de um pagamento com cartão.
///
/// Com antecipação automática (só crédito) o repasse cai em D+1 e a taxa de
/// antecipação soma-se à taxa da modalidade, ambas sobre o valor bruto.
/// O arredondamento acontece uma única vez, na taxa final; o líquido é
/// `bruto - taxa`, então os dois sempre fecham com o bruto.
pub fn calculate(
    operator: &CardOperator,
    overrides: &[InstallmentRate],
    modality: CardModality,
    installments: i32,
    gross_amount: Decimal,
    payment_date: NaiveDate,
) -> Result<Settlement, AppError> {
    if !operator.active {
        return Err(AppError::InvalidOperatorConfig(format!(
            "operadora '{}' está inativa",
            operator.name
        )));
    }
    if gross_amount <= Decimal::ZERO {
        return Err(AppError::InvalidPayment("valor deve ser maior que zero".into()));
    }
    if !(1..=MAX_INSTALLMENTS).contains(&installments) {
        return Err(AppError::InvalidPayment(format!(
            "parcelas devem estar entre 1 e {}",
            MAX_INSTALLMENTS
        )));
    }

    let terms = resolve_terms(operator, overrides, modality, installments)?;

    let anticipated = modality == CardModality::Credito && operator.auto_anticipation;
    let (anticipation_rate, days) = if anticipated {
        (terms.anticipation_rate, 1)
    } else {
        (Decimal::ZERO, terms.days)
    };

    let raw_fee = gross_amount * terms.rate / Decimal::ONE_HUNDRED
        + gross_amount * anticipation_rate / Decimal::ONE_HUNDRED;
    let fee_amount = round_money(raw_fee);
    let net_amount = gross_amount - fee_amount;

    let settlement_date = payment_date
        .checked_add_days(Days::new(days as u64))
        .ok_or_else(|| AppError::InvalidOperatorConfig("prazo fora do calendário".into()))?;

    Ok(Settlement {
        rate: terms.rate,
        anticipation_rate,
        fee_amount,
        net_amount,
        settlement_date,
        anticipated,
    })
}

/// Validação de cadastro: recusa taxas ou prazos negativos, parcelas fora de 2..=18
/// e taxa (somada à antecipação, no crédito) acima de 100%.
/// Roda sobre os campos, antes de qualquer gravação.
pub fn validate_operator(
    fields: &CardOperatorFields<'_>,
    overrides: &[InstallmentRate],
) -> Result<(), AppError> {
    let rates = [
        ("taxa de débito", fields.debit_rate),
        ("taxa de crédito à vista", fields.credit_rate),
        ("taxa de crédito parcelado", fields.installment_rate),
        ("taxa de antecipação", Some(fields.anticipation_rate)),
    ];
    for (field, rate) in rates {
        if rate.is_some_and(|r| r.is_sign_negative()) {
            return Err(AppError::InvalidOperatorConfig(format!("{} negativa", field)));
        }
        if rate.is_some_and(|r| r > MAX_RATE) {
            return Err(AppError::InvalidOperatorConfig(format!("{} acima de 100%", field)));
        }
    }

    // Crédito pode receber a antecipação por cima da taxa da modalidade
    let credit_rates = [
        ("crédito à vista", fields.credit_rate),
        ("crédito parcelado", fields.installment_rate),
    ];
    for (field, rate) in credit_rates {
        if rate.is_some_and(|r| r + fields.anticipation_rate > MAX_RATE) {
            return Err(AppError::InvalidOperatorConfig(format!(
                "taxa de {} somada à antecipação passa de 100%",
                field
            )));
        }
    }

    let days = [
        ("prazo de débito", fields.debit_days),
        ("prazo de crédito à vista", fields.credit_days),
        ("prazo de crédito parcelado", fields.installment_days),
    ];
    for (field, value) in days {
        if value.is_some_and(|d| d < 0) {
            return Err(AppError::InvalidOperatorConfig(format!("{} negativo", field)));
        }
    }

    let mut seen = Vec::with_capacity(overrides.len());
    for o in overrides {
        if !(2..=MAX_INSTALLMENTS).contains(&o.installments) {
            return Err(AppError::InvalidOperatorConfig(format!(
                "taxa por parcela deve usar entre 2 e {} parcelas (recebido {})",
                MAX_INSTALLMENTS, o.installments
            )));
        }
        if seen.contains(&o.installments) {
            return Err(AppError::InvalidOperatorConfig(format!(
                "taxa para {}x repetida",
                o.installments
            )));
        }
        seen.push(o.installments);

        let anticipation = o.anticipation_rate.unwrap_or(fields.anticipation_rate);
        let negative = o.total_rate.is_sign_negative() || anticipation.is_sign_negative();
        if negative {
            return Err(AppError::InvalidOperatorConfig(format!(
                "taxa negativa para {}x",
                o.installments
            )));
        }
        if o.total_rate + anticipation > MAX_RATE {
            return Err(AppError::InvalidOperatorConfig(format!(
                "taxa para {}x somada à antecipação passa de 100%",
                o.installments
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn operator() -> CardOperator {
        CardOperator {
            id: 1,
            name: "Cielo".into(),
            debit_rate: Some(dec!(1.5)),
            debit_days: Some(1),
            credit_rate: Some(dec!(3)),
            credit_days: Some(30),
            installment_rate: Some(dec!(5)),
            installment_days: Some(30),
            anticipation_rate: dec!(2),
            auto_anticipation: false,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[test]
    fn installment_default_rate_and_term() {
        let s = calculate(&operator(), &[], CardModality::Credito, 3, dec!(1000.00), date()).unwrap();
        assert_eq!(s.fee_amount, dec!(50.00));
        assert_eq!(s.net_amount, dec!(950.00));
        assert_eq!(s.settlement_date, NaiveDate::from_ymd_opt(2025, 4, 9).unwrap());
        assert!(!s.anticipated);
    }

    #[test]
    fn installment_override_changes_rate_but_not_term() {
        let overrides = [InstallmentRate {
            operator_id: 1,
            installments: 3,
            total_rate: dec!(4),
            anticipation_rate: None,
        }];
        let s = calculate(&operator(), &overrides, CardModality::Credito, 3, dec!(1000.00), date())
            .unwrap();
        assert_eq!(s.fee_amount, dec!(40.00));
        assert_eq!(s.net_amount, dec!(960.00));
        assert_eq!(s.settlement_date, NaiveDate::from_ymd_opt(2025, 4, 9).unwrap());

        // Override de outra parcela não interfere
        let s = calculate(&operator(), &overrides, CardModality::Credito, 4, dec!(1000.00), date())
            .unwrap();
        assert_eq!(s.fee_amount, dec!(50.00));
    }

    #[test]
    fn anticipation_stacks_on_top_of_rate() {
        let mut op = operator();
        op.auto_anticipation = true;
        let s = calculate(&op, &[], CardModality::Credito, 3, dec!(1000.00), date()).unwrap();
        assert_eq!(s.fee_amount, dec!(70.00));
        assert_eq!(s.net_amount, dec!(930.00));
        assert_eq!(s.settlement_date, NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
        assert!(s.anticipated);
    }

    #[test]
    fn override_anticipation_rate_wins_over_default() {
        let mut op = operator();
        op.auto_anticipation = true;
        let overrides = [InstallmentRate {
            operator_id: 1,
            installments: 6,
            total_rate: dec!(6),
            anticipation_rate: Some(dec!(3.5)),
        }];
        let s = calculate(&op, &overrides, CardModality::Credito, 6, dec!(200.00), date()).unwrap();
        assert_eq!(s.fee_amount, dec!(19.00));
        assert_eq!(s.anticipation_rate, dec!(3.5));
    }

    #[test]
    fn single_installment_credit_uses_cash_rate() {
        let s = calculate(&operator(), &[], CardModality::Credito, 1, dec!(250.00), date()).unwrap();
        assert_eq!(s.rate, dec!(3));
        assert_eq!(s.fee_amount, dec!(7.50));
        assert_eq!(s.settlement_date, NaiveDate::from_ymd_opt(2025, 4, 9).unwrap());
    }

    #[test]
    fn debit_never_anticipates() {
        let mut op = operator();
        op.auto_anticipation = true;
        let s = calculate(&op, &[], CardModality::Debito, 1, dec!(100.00), date()).unwrap();
        assert!(!s.anticipated);
        assert_eq!(s.fee_amount, dec!(1.50));
        assert_eq!(s.net_amount, dec!(98.50));
        assert_eq!(s.settlement_date, NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());

        assert!(matches!(
            calculate(&op, &[], CardModality::Debito, 2, dec!(100.00), date()),
            Err(AppError::InvalidPayment(_))
        ));
    }

    #[test]
    fn rounds_only_the_final_fee_half_up() {
        let mut op = operator();
        op.credit_rate = Some(dec!(2.5));
        // 5.00 * 2.5% = 0.125 -> 0.13
        let s = calculate(&op, &[], CardModality::Credito, 1, dec!(5.00), date()).unwrap();
        assert_eq!(s.fee_amount, dec!(0.13));
        assert_eq!(s.net_amount, dec!(4.87));
        assert_eq!(s.fee_amount + s.net_amount, dec!(5.00));
    }

    #[test]
    fn malformed_configuration_fails_closed() {
        let mut op = operator();
        op.installment_rate = Some(dec!(-1));
        assert!(matches!(
            calculate(&op, &[], CardModality::Credito, 2, dec!(100), date()),
            Err(AppError::InvalidOperatorConfig(_))
        ));

        let mut op = operator();
        op.debit_days = None;
        assert!(matches!(
            calculate(&op, &[], CardModality::Debito, 1, dec!(100), date()),
            Err(AppError::InvalidOperatorConfig(_))
        ));

        let mut op = operator();
        op.active = false;
        assert!(calculate(&op, &[], CardModality::Debito, 1, dec!(100), date()).is_err());
    }

    #[test]
    fn rejects_installments_out_of_range_and_non_positive_amount() {
        let op = operator();
        assert!(matches!(
            calculate(&op, &[], CardModality::Credito, 19, dec!(100), date()),
            Err(AppError::InvalidPayment(_))
        ));
        assert!(matches!(
            calculate(&op, &[], CardModality::Credito, 0, dec!(100), date()),
            Err(AppError::InvalidPayment(_))
        ));
        assert!(matches!(
            calculate(&op, &[], CardModality::Credito, 1, dec!(0), date()),
            Err(AppError::InvalidPayment(_))
        ));
    }

    fn fields(op: &CardOperator) -> CardOperatorFields<'_> {
        CardOperatorFields {
            name: &op.name,
            debit_rate: op.debit_rate,
            debit_days: op.debit_days,
            credit_rate: op.credit_rate,
            credit_days: op.credit_days,
            installment_rate: op.installment_rate,
            installment_days: op.installment_days,
            anticipation_rate: op.anticipation_rate,
            auto_anticipation: op.auto_anticipation,
            active: op.active,
        }
    }

    #[test]
    fn validate_operator_checks_override_table() {
        let op = operator();
        assert!(validate_operator(&fields(&op), &[]).is_ok());

        let dup = [
            InstallmentRate { operator_id: 1, installments: 2, total_rate: dec!(4), anticipation_rate: None },
            InstallmentRate { operator_id: 1, installments: 2, total_rate: dec!(4.5), anticipation_rate: None },
        ];
        assert!(validate_operator(&fields(&op), &dup).is_err());

        let out_of_range = [InstallmentRate {
            operator_id: 1,
            installments: 1,
            total_rate: dec!(4),
            anticipation_rate: None,
        }];
        assert!(validate_operator(&fields(&op), &out_of_range).is_err());

        let mut negative = operator();
        negative.credit_days = Some(-2);
        assert!(validate_operator(&fields(&negative), &[]).is_err());
    }

    #[test]
    fn validate_operator_rejects_fee_above_gross() {
        let mut op = operator();
        op.installment_rate = Some(dec!(101));
        assert!(matches!(
            validate_operator(&fields(&op), &[]),
            Err(AppError::InvalidOperatorConfig(_))
        ));

        // 70% de crédito + 40% de antecipação deixaria o líquido negativo
        let mut op = operator();
        op.credit_rate = Some(dec!(70));
        op.anticipation_rate = dec!(40);
        op.auto_anticipation = true;
        assert!(validate_operator(&fields(&op), &[]).is_err());

        let op = operator();
        let override_too_high = [InstallmentRate {
            operator_id: 1,
            installments: 12,
            total_rate: dec!(90),
            anticipation_rate: Some(dec!(15)),
        }];
        assert!(validate_operator(&fields(&op), &override_too_high).is_err());

        // Exatamente 100% ainda fecha: líquido zero, nunca negativo
        let mut op = operator();
        op.credit_rate = Some(dec!(98));
        op.anticipation_rate = dec!(2);
        assert!(validate_operator(&fields(&op), &[]).is_ok());
    }
}
