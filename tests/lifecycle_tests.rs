// Position lifecycle managers against the mock broker

mod common;

use std::sync::Arc;

use common::{create_temp_db_dir, open_position, MockGateway};
use forex_assist::lifecycle::hedge::{evaluate_pair, find_hedge_pairs};
use forex_assist::{
    Config, Database, Direction, HedgeDecision, HedgeManager, MarketDirection, OrderManager,
    PartialProfitManager, TradingJournal,
};

fn order_manager(gateway: Arc<MockGateway>) -> (tempfile::TempDir, Arc<OrderManager>) {
    let (dir, path) = create_temp_db_dir();
    let db = Database::new(path).unwrap();
    db.run_migrations().unwrap();
    let journal = Arc::new(TradingJournal::new(db.get_connection()));
    (dir, Arc::new(OrderManager::new(gateway, Config::default().risk, journal)))
}

#[tokio::test]
async fn ladder_rungs_fire_once_each_and_use_original_volume() {
    let gateway = Arc::new(MockGateway::new());
    {
        let mut position = open_position(11, "EURUSD", Direction::Buy, 0.0);
        position.volume = 1.0;
        position.open_price = 1.0800;
        position.stop_loss = Some(1.0780); // 1R = 20 pips
        gateway.positions.lock().unwrap().push(position);
    }
    gateway.set_quote("EURUSD", 1.0840, 1.0840); // 2R in profit

    let manager = PartialProfitManager::new(gateway.clone(), Config::default().partial_profit);
    manager.tick().await;
    manager.tick().await;
    manager.tick().await;

    let closes = gateway.partial_closes.lock().unwrap().clone();
    // 1R and 2R rungs only, each exactly once, sized from the original lot
    assert_eq!(closes, vec![(11, 0.5), (11, 0.25)]);

    // The mock shrank the position; the rung sizes must not have compounded
    let remaining = gateway.positions.lock().unwrap()[0].volume;
    assert!((remaining - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn trailing_stop_never_retreats() {
    let gateway = Arc::new(MockGateway::new());
    {
        let mut position = open_position(21, "EURUSD", Direction::Buy, 0.0);
        position.open_price = 1.0800;
        position.stop_loss = Some(1.0780);
        gateway.positions.lock().unwrap().push(position);
    }
    let manager = PartialProfitManager::new(gateway.clone(), Config::default().partial_profit);

    gateway.set_quote("EURUSD", 1.0850, 1.0850); // 2.5R
    manager.tick().await;
    let stops_after_advance = gateway.stop_updates.lock().unwrap().clone();
    let best = stops_after_advance.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
    assert!(best > 1.0780);

    gateway.set_quote("EURUSD", 1.0825, 1.0825); // retrace
    manager.tick().await;
    let stops = gateway.stop_updates.lock().unwrap().clone();
    assert_eq!(stops.len(), stops_after_advance.len(), "no update on retrace");

    gateway.set_quote("EURUSD", 1.0880, 1.0880); // new high ground
    manager.tick().await;
    let stops = gateway.stop_updates.lock().unwrap().clone();
    let new_best = stops.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
    assert!(new_best > best, "stop follows a favorable move");
}

#[test]
fn hedge_net_profit_is_the_exact_leg_sum() {
    let positions = vec![
        open_position(1, "EURUSD", Direction::Buy, 42.5),
        open_position(2, "EURUSD", Direction::Sell, -17.25),
        open_position(3, "GBPUSD", Direction::Buy, 99.0), // no SELL side
    ];
    let pairs = find_hedge_pairs(&positions);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].net_profit(), 42.5 - 17.25);
}

#[test]
fn hedge_decision_table_honours_strong_direction_first() {
    use forex_assist::analysis::DirectionAnalysis;
    use forex_assist::types::TradeAction;

    let positions = vec![
        open_position(1, "EURUSD", Direction::Buy, -20.0),
        open_position(2, "EURUSD", Direction::Sell, 80.0),
    ];
    let pair = &find_hedge_pairs(&positions)[0];
    let config = Config::default().hedge;

    // Net is +60 (above min_net_profit) but a strong bullish read still
    // releases the SELL leg instead of closing both
    let bullish = DirectionAnalysis {
        direction: MarketDirection::Bullish,
        confidence: 85.0,
        recommended_action: TradeAction::Buy,
        reasoning: vec![],
    };
    assert_eq!(evaluate_pair(pair, &bullish, &config).decision, HedgeDecision::CloseSell);

    let neutral = DirectionAnalysis {
        direction: MarketDirection::Neutral,
        confidence: 50.0,
        recommended_action: TradeAction::Wait,
        reasoning: vec![],
    };
    assert_eq!(evaluate_pair(pair, &neutral, &config).decision, HedgeDecision::CloseBoth);
}

#[tokio::test]
async fn execute_decision_tolerates_a_leg_that_already_closed() {
    let gateway = Arc::new(MockGateway::new());
    gateway.set_quote("EURUSD", 1.0850, 1.0850);
    {
        let mut positions = gateway.positions.lock().unwrap();
        positions.push(open_position(1, "EURUSD", Direction::Buy, 30.0));
        positions.push(open_position(2, "EURUSD", Direction::Sell, -10.0));
    }
    let (_dir, orders) = order_manager(Arc::clone(&gateway));
    let manager = HedgeManager::new(gateway.clone(), orders, Config::default().hedge);

    let assessments = manager.evaluate_all().await;
    assert_eq!(assessments.len(), 1);
    let assessment = assessments.into_iter().next().unwrap();
    assert_eq!(assessment.decision, HedgeDecision::CloseBoth); // net +20, no candles for a view

    // The SELL leg vanishes between evaluation and execution
    gateway.positions.lock().unwrap().retain(|p| p.ticket != 2);
    manager.execute_decision(&assessment).await.unwrap();
    assert!(gateway.positions.lock().unwrap().is_empty());
}
