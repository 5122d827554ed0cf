use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

pub const MONEY_DECIMAL_PLACES: u32 = 2;
pub const QUANTITY_DECIMAL_PLACES: u32 = 3;

/// Tolerância do fechamento: diferenças até 5 centavos contam como quitado.
pub const CLOSURE_EPSILON: Decimal = dec!(0.05);

/// Arredondamento comercial (meio para cima) em 2 casas.
/// Usar só no passo final de um cálculo, nunca em valores intermediários.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Valor monetário válido: não negativo e com no máximo 2 casas.
pub fn is_money_amount(value: Decimal) -> bool {
    !value.is_sign_negative() && value.normalize().scale() <= MONEY_DECIMAL_PLACES
}

/// Quantidade gravável em `NUMERIC(14, 3)` sem arredondar.
pub fn is_quantity(value: Decimal) -> bool {
    value > Decimal::ZERO && value.normalize().scale() <= QUANTITY_DECIMAL_PLACES
}
