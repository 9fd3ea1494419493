//! Depth-aware fill price calculations.

use rust_decimal::Decimal;

use super::types::OrderLevel;

/// Size-weighted average price of filling `quantity` by walking `levels`
/// from the best level outward.
///
/// Each level is consumed in full before the next one is touched; the last
/// level used is truncated to whatever quantity remains. Returns `None` when
/// the cumulative size of all levels is below `quantity`.
pub fn effective_price(levels: &[OrderLevel], quantity: Decimal) -> Option<Decimal> {
    let best = levels.first()?;

    if quantity <= best.size {
        return Some(best.price);
    }

    let (remaining, total_cost) = levels.iter().fold(
        (quantity, Decimal::ZERO),
        |(remaining, total_cost), level| {
            if remaining.is_zero() {
                return (remaining, total_cost);
            }
            let filled = remaining.min(level.size);
            (remaining - filled, total_cost + filled * level.price)
        },
    );

    if remaining.is_zero() {
        Some(total_cost / quantity)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::{BookSide, OrderBook};
    use rust_decimal_macros::dec;

    fn ladder(levels: &[(Decimal, Decimal)]) -> Vec<OrderLevel> {
        levels.iter().map(|&(p, s)| OrderLevel::new(p, s)).collect()
    }

    #[test]
    fn empty_ladder_has_no_price() {
        assert_eq!(effective_price(&[], dec!(50)), None);
    }

    #[test]
    fn single_large_level_returns_its_price() {
        let asks = ladder(&[(dec!(10), dec!(100))]);
        assert_eq!(effective_price(&asks, dec!(50)), Some(dec!(10)));
    }

    #[test]
    fn single_exact_level_returns_its_price() {
        let asks = ladder(&[(dec!(10), dec!(50))]);
        assert_eq!(effective_price(&asks, dec!(50)), Some(dec!(10)));
    }

    #[test]
    fn partial_fill_of_second_level() {
        // 30 @ 10 + 10 @ 12 = 420 over 40 contracts
        let asks = ladder(&[(dec!(10), dec!(30)), (dec!(12), dec!(30))]);
        assert_eq!(effective_price(&asks, dec!(40)), Some(dec!(10.5)));
    }

    #[test]
    fn exact_fill_across_levels() {
        // 30 @ 10 + 20 @ 12 = 540 over 50 contracts
        let asks = ladder(&[(dec!(10), dec!(30)), (dec!(12), dec!(20))]);
        assert_eq!(effective_price(&asks, dec!(50)), Some(dec!(10.8)));
    }

    #[test]
    fn insufficient_liquidity_has_no_price() {
        let asks = ladder(&[(dec!(10), dec!(20))]);
        assert_eq!(effective_price(&asks, dec!(50)), None);

        let asks = ladder(&[(dec!(10), dec!(20)), (dec!(11), dec!(29))]);
        assert_eq!(effective_price(&asks, dec!(50)), None);
    }

    #[test]
    fn undefined_exactly_when_quantity_exceeds_total() {
        let book = OrderBook::new(
            ladder(&[(dec!(0.40), dec!(10)), (dec!(0.45), dec!(15)), (dec!(0.50), dec!(5))]),
            vec![],
        );
        let total = book.total_size(BookSide::Ask);

        assert!(book.effective_price(BookSide::Ask, total).is_some());
        assert!(book.effective_price(BookSide::Ask, total + dec!(0.01)).is_none());
    }

    #[test]
    fn ask_side_price_is_non_decreasing_in_quantity() {
        let book = OrderBook::new(
            ladder(&[(dec!(0.52), dec!(7)), (dec!(0.50), dec!(5)), (dec!(0.61), dec!(12))]),
            vec![],
        );

        let mut previous = Decimal::ZERO;
        for q in 1..=24 {
            let price = book
                .effective_price(BookSide::Ask, Decimal::from(q))
                .unwrap();
            assert!(price >= previous, "q={q}: {price} < {previous}");
            previous = price;
        }
    }

    #[test]
    fn bid_side_price_is_non_increasing_in_quantity() {
        let book = OrderBook::new(
            vec![],
            ladder(&[(dec!(0.44), dec!(6)), (dec!(0.48), dec!(4)), (dec!(0.40), dec!(10))]),
        );

        let mut previous = Decimal::ONE;
        for q in 1..=20 {
            let price = book
                .effective_price(BookSide::Bid, Decimal::from(q))
                .unwrap();
            assert!(price <= previous, "q={q}: {price} > {previous}");
            previous = price;
        }
    }

    #[test]
    fn within_best_level_equals_best_price() {
        let book = OrderBook::new(
            ladder(&[(dec!(0.33), dec!(8)), (dec!(0.35), dec!(8))]),
            ladder(&[(dec!(0.30), dec!(3))]),
        );

        for q in [dec!(0.5), dec!(1), dec!(7.99), dec!(8)] {
            assert_eq!(book.effective_price(BookSide::Ask, q), Some(dec!(0.33)));
        }
        assert_eq!(book.effective_price(BookSide::Bid, dec!(3)), Some(dec!(0.30)));
    }
}
