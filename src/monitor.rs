//! Monitor Loop — the top-level cycle run once per
//! `check_interval_secs` while the market is open. Each tick: reload
//! config, snapshot the portfolio and quotes, check for an overnight gap,
//! check the VIX regime, run the Policy Engine, dispatch any scheduled
//! review/discovery/briefing that's due, and maybe enter/exit defensive
//! or rotation mode.

use crate::agent::{AgentPort, PromptBuilder, Trigger};
use crate::alerts::AlertWriter;
use crate::clock::Clock;
use crate::config::ConfigStore;
use crate::controllers::{DefensiveController, RotationController};
use crate::controllers::rotation::RotationTransition;
use crate::domain::{OrderType, VixRegime};
use crate::fallback::FallbackEngine;
use crate::policy;
use crate::ports::{BrokerPort, QuotePort};
use crate::scheduler::Scheduler;
use crate::state::StateStore;
use crate::state::files::{
    LAST_DISCOVERY_FILE, LAST_REVIEW_FILE, LastDiscovery, LastReview, OVERNIGHT_STATE_FILE,
    OvernightState, PRIOR_CLOSE_FILE, PriorClose, VIX_LOG_FILE, VixHistory, VixHistoryEntry,
};
use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

pub struct Monitor<C: Clock, B: BrokerPort, Q: QuotePort, A: AgentPort> {
    pub clock: C,
    pub broker: B,
    pub quotes: Q,
    pub agent: A,
    pub state: StateStore,
    pub config: ConfigStore,
    pub dry_run: bool,
    check_interval_secs: u64,
    consecutive_api_failures: u32,
    circuit_breaker_tripped_today: bool,
    breaker_date: Option<chrono::NaiveDate>,
    was_in_market: Option<bool>,
}

impl<C: Clock, B: BrokerPort, Q: QuotePort, A: AgentPort> Monitor<C, B, Q, A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: C,
        broker: B,
        quotes: Q,
        agent: A,
        state: StateStore,
        config: ConfigStore,
        dry_run: bool,
        check_interval_secs: u64,
    ) -> Self {
        Self {
            clock,
            broker,
            quotes,
            agent,
            state,
            config,
            dry_run,
            check_interval_secs,
            consecutive_api_failures: 0,
            circuit_breaker_tripped_today: false,
            breaker_date: None,
            was_in_market: None,
        }
    }

    /// The circuit breaker is one-shot per calendar day: the first
    /// tick of a new exchange-local day clears yesterday's trip.
    fn maybe_reset_daily_breaker(&mut self, today: chrono::NaiveDate) {
        if self.breaker_date != Some(today) {
            self.breaker_date = Some(today);
            self.circuit_breaker_tripped_today = false;
        }
    }

    /// Run forever, sleeping `check_interval_secs` between in-market
    /// cycles and 1 minute between off-hours cycles, stopping promptly
    /// when `shutdown` resolves.
    pub async fn run(&mut self, mut shutdown: tokio::sync::oneshot::Receiver<()>) -> Result<()> {
        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(tokio::sync::oneshot::error::TryRecvError::Closed) => {
                    info!("shutdown signal received, stopping monitor loop");
                    return Ok(());
                }
                Err(tokio::sync::oneshot::error::TryRecvError::Empty) => {}
            }

            let in_market = self.clock.is_market_hours();
            if let Err(e) = self.tick().await {
                warn!("monitor cycle failed: {e:#}");
            }

            let sleep_secs = if in_market { self.check_interval_secs } else { 60 };
            tokio::time::sleep(std::time::Duration::from_secs(sleep_secs)).await;
        }
    }

    /// One full cycle of the loop. Out-of-market ticks (premarket,
    /// weekend, overnight) take a lightweight branch that only dispatches
    /// overnight scans/briefings; in-market ticks run the full steps 1-8.
    pub async fn tick(&mut self) -> Result<()> {
        let wc = self.clock.now();
        let now_utc = wc.exchange_time.with_timezone(&Utc);
        self.maybe_reset_daily_breaker(now_utc.date_naive());

        // Step 1: market-hours gate. On the in-market -> out-of-market
        // transition, snapshot the actual closing total so tomorrow's
        // overnight-gap check compares against today's real close rather
        // than today's opening baseline.
        let in_market = self.clock.is_market_hours();
        if self.was_in_market == Some(true) && !in_market {
            self.persist_prior_close(now_utc).await?;
        }
        self.was_in_market = Some(in_market);

        if !in_market {
            let (config, reloaded) = self.config.maybe_reload();
            let config = config.clone();
            if reloaded {
                info!("policy config reloaded");
            }
            return self.dispatch_overnight_and_briefings(&wc, &config, now_utc).await;
        }

        // Step 2: config reload.
        let (config, reloaded) = self.config.maybe_reload();
        let config = config.clone();
        if reloaded {
            info!("policy config reloaded");
        }

        // Step 3: portfolio + price snapshot. The broker's own quote is
        // the baseline; a fresher quote fan-out refreshes whichever
        // tickers the quote provider could answer this cycle, leaving the
        // rest on the broker's price.
        let mut snapshot = self.broker.get_portfolio().await?;
        let tickers: Vec<String> = snapshot.positions.keys().cloned().collect();
        let fresh_prices = self.quotes.spot(&tickers).await;
        for (ticker, price) in fresh_prices {
            if let Some(pos) = snapshot.positions.get_mut(&ticker) {
                pos.current_price = price;
            }
        }
        let minutes_to_close = self.clock.minutes_to_close();

        // Step 4: overnight gap check against yesterday's close. The
        // stored value is only refreshed once per calendar day so it also
        // serves as today's start-of-day baseline for the circuit breaker
        // in step 8 — overwriting it every tick would make the breaker
        // compare the snapshot against itself.
        let prior_close: Option<PriorClose> = self.state.read(PRIOR_CLOSE_FILE);
        let today = now_utc.date_naive();
        if let Some(prior) = &prior_close
            && prior.date != today
            && policy::gap_triggered(prior.total_value, snapshot.total_value(), config.circuit_breaker.gap_threshold)
        {
            self.enter_defensive(&snapshot, &config, config.circuit_breaker.gap_threshold, now_utc)
                .await?;
        }
        if prior_close.as_ref().map(|p| p.date) != Some(today) {
            self.state.write(
                PRIOR_CLOSE_FILE,
                &PriorClose {
                    date: today,
                    total_value: snapshot.total_value(),
                },
            )?;
        }

        // Step 5: VIX regime check.
        if let Some(vix) = self.quotes.vix().await {
            self.check_vix_regime(vix, now_utc, &snapshot, &config).await?;
        }

        // Step 6: scheduled review / discovery / briefing dispatch.
        let last_review: Option<LastReview> = self.state.read(LAST_REVIEW_FILE);
        if Scheduler::is_review_due(&wc, last_review.map(|r| r.timestamp), &config, minutes_to_close) {
            self.dispatch_scheduled_review(&snapshot, &config).await?;
            self.state.write(LAST_REVIEW_FILE, &LastReview { timestamp: now_utc })?;
        }

        let last_discovery: Option<LastDiscovery> = self.state.read(LAST_DISCOVERY_FILE);
        if Scheduler::is_discovery_due(&wc, last_discovery.map(|d| d.timestamp), &config) {
            self.dispatch_discovery(&config).await?;
            self.state.write(LAST_DISCOVERY_FILE, &LastDiscovery { timestamp: now_utc })?;
        }

        self.dispatch_overnight_and_briefings(&wc, &config, now_utc).await?;

        // Step 7: policy engine — stop-losses, profit-protection, dip-buy,
        // in that priority order.
        let defensive_state = DefensiveController::new(&self.state).current();
        let defensive_floor = defensive_state.active.then_some(config.defensive.defensive_stop_loss);
        let regime = self.current_regime();

        let mut urgent_actions = policy::evaluate_stop_losses(&snapshot, &config, regime, defensive_floor);
        urgent_actions.extend(policy::evaluate_profit_protection(&snapshot, &config));

        let mut triggered_review = false;
        for action in &urgent_actions {
            if !self.dry_run {
                self.broker
                    .submit_order(&action.ticker, action.side, action.quantity, action.order_type, None)
                    .await?;
            }
            info!("policy action: {} {:?} {} {}", action.ticker, action.kind, action.quantity, action.reason);
            if action.request_review {
                triggered_review = true;
            }
        }
        if triggered_review {
            let ticker = urgent_actions
                .iter()
                .find(|a| a.request_review)
                .map(|a| a.ticker.clone())
                .unwrap_or_default();
            self.invoke_agent(Trigger::ProfitProtection, &PromptBuilder::profit_protection(&ticker))
                .await?;
        }

        if urgent_actions.is_empty() {
            let dip_actions = policy::evaluate_dip_buy(&snapshot, &config, defensive_state.active);
            for action in &dip_actions {
                if !self.dry_run {
                    self.broker
                        .submit_order(&action.ticker, action.side, action.quantity, OrderType::Market, None)
                        .await?;
                }
                info!("dip-buy: {} {} {}", action.ticker, action.quantity, action.reason);
            }

            // Rotation is only evaluated when there were no urgent actions
            // this cycle.
            self.maybe_evaluate_rotation(&snapshot, &config, now_utc).await?;
        }

        // Step 8: circuit breaker + defensive-exit check. The exit check
        // uses `defensive_state` as it stood at the *start* of this tick
        // (captured in step 7), not a post-trip re-read — otherwise a
        // fresh trip this same tick would immediately "recover" against
        // its own pre-trip snapshot (selling a position doesn't change
        // total portfolio value) and exit before a single later tick
        // ever observed it active.
        self.check_circuit_breaker(&snapshot, &config, now_utc).await?;
        if defensive_state.active {
            DefensiveController::new(&self.state).maybe_exit(&defensive_state, &snapshot, now_utc)?;
        }

        Ok(())
    }

    async fn persist_prior_close(&mut self, now_utc: chrono::DateTime<Utc>) -> Result<()> {
        let snapshot = self.broker.get_portfolio().await?;
        self.state.write(
            PRIOR_CLOSE_FILE,
            &PriorClose {
                date: now_utc.date_naive(),
                total_value: snapshot.total_value(),
            },
        )?;
        Ok(())
    }

    fn current_regime(&self) -> VixRegime {
        let history: VixHistory = self.state.read(VIX_LOG_FILE).unwrap_or_default();
        history
            .last()
            .map(|e| VixRegime::classify(e.vix))
            .unwrap_or(VixRegime::Normal)
    }

    async fn check_vix_regime(
        &mut self,
        vix: f64,
        now: chrono::DateTime<Utc>,
        snapshot: &crate::domain::PortfolioSnapshot,
        config: &crate::config::PolicyConfig,
    ) -> Result<()> {
        let mut history: VixHistory = self.state.read(VIX_LOG_FILE).unwrap_or_default();
        let previous_regime = history.last().map(|e| VixRegime::classify(e.vix));
        let new_regime = VixRegime::classify(vix);

        history.push(VixHistoryEntry {
            timestamp: now,
            vix,
            regime: new_regime.to_string(),
        });
        self.state.write(VIX_LOG_FILE, &history)?;

        if let Some(prev) = previous_regime
            && VixRegime::is_significant_transition(prev, new_regime)
        {
            info!("VIX regime transition: {prev} -> {new_regime} (vix={vix})");
            let alerts = AlertWriter::new(&self.state);
            alerts.write_vix_alert(prev.to_string(), new_regime.to_string(), vix)?;

            let beta_actions = policy::evaluate_vix_regime_actions(snapshot, config, new_regime);
            for action in &beta_actions {
                if !self.dry_run {
                    self.broker
                        .submit_order(&action.ticker, action.side, action.quantity, action.order_type, None)
                        .await?;
                }
                info!("vix-regime action: {} {:?} {} {}", action.ticker, action.kind, action.quantity, action.reason);
            }

            self.invoke_agent(Trigger::VixAlert, &PromptBuilder::vix_alert(&prev.to_string(), &new_regime.to_string(), vix))
                .await?;
        }
        Ok(())
    }

    async fn dispatch_scheduled_review(
        &mut self,
        snapshot: &crate::domain::PortfolioSnapshot,
        config: &crate::config::PolicyConfig,
    ) -> Result<()> {
        let alerts = AlertWriter::new(&self.state);
        alerts.write_scheduled_review(serde_json::json!({
            "total_value": snapshot.total_value().to_string(),
            "short_count": snapshot.short_count(),
        }))?;

        let existing_shorts: Vec<String> = snapshot
            .positions
            .values()
            .filter(|p| p.is_short())
            .map(|p| p.ticker.clone())
            .collect();

        let prompt = PromptBuilder::scheduled(
            config.review_intervals.strategy_hours,
            &existing_shorts,
            config.short_selling.max_short_positions,
            config.capital_management.opportunity_reserve_fraction,
            config.capital_management.max_margin_fraction,
        );
        self.invoke_agent(Trigger::Scheduled, &prompt).await
    }

    async fn dispatch_discovery(&mut self, config: &crate::config::PolicyConfig) -> Result<()> {
        let alerts = AlertWriter::new(&self.state);
        alerts.write_discovery(config.scan_universe.clone())?;
        let prompt = PromptBuilder::discovery(&config.scan_universe, &config.watchlist, "normal", "standard limits apply");
        self.invoke_agent(Trigger::Discovery, &prompt).await
    }

    async fn dispatch_overnight_and_briefings(
        &mut self,
        wc: &crate::clock::WallClock,
        config: &crate::config::PolicyConfig,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let mut overnight: OvernightState = self.state.read(OVERNIGHT_STATE_FILE).unwrap_or_default();

        if Scheduler::is_overnight_scan_due(wc, overnight.last_scan, &config.overnight_scan_times) {
            overnight.last_scan = Some(now);
        }

        if Scheduler::is_premarket_briefing_due(wc, overnight.last_premarket_briefing_date, &config.premarket_briefing_clock)
        {
            overnight.last_premarket_briefing_date = Some(wc.local_time.date_naive());
            self.invoke_agent(Trigger::Premarket, &PromptBuilder::premarket()).await?;
        }

        if Scheduler::is_weekend_briefing_due(wc, overnight.last_weekend_briefing_date, &config.weekend_briefing_clock) {
            overnight.last_weekend_briefing_date = Some(wc.local_time.date_naive());
            self.invoke_agent(Trigger::Weekend, &PromptBuilder::weekend()).await?;
        }

        self.state.write(OVERNIGHT_STATE_FILE, &overnight)?;
        Ok(())
    }

    async fn maybe_evaluate_rotation(
        &mut self,
        snapshot: &crate::domain::PortfolioSnapshot,
        config: &crate::config::PolicyConfig,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let mut signals = std::collections::HashMap::new();
        for pos in snapshot.long_tickers() {
            signals.insert(pos.ticker.clone(), self.quotes.technical_signal(&pos.ticker).await);
        }

        let rotation = RotationController::new(&self.state);
        match rotation.evaluate(snapshot, config, &signals, now)? {
            Some(RotationTransition::Enter) => {
                self.invoke_agent(
                    Trigger::Rotation,
                    &PromptBuilder::rotation_enter(&config.rotation_trigger.vice_tickers, config.rotation_trigger.max_vice_allocation_pct),
                )
                .await?;
            }
            Some(RotationTransition::Exit) => {
                self.invoke_agent(Trigger::Rotation, &PromptBuilder::rotation_exit(&config.rotation_trigger.vice_tickers))
                    .await?;
            }
            None => {}
        }
        Ok(())
    }

    async fn check_circuit_breaker(
        &mut self,
        snapshot: &crate::domain::PortfolioSnapshot,
        config: &crate::config::PolicyConfig,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        if self.circuit_breaker_tripped_today {
            return Ok(());
        }
        let prior: Option<PriorClose> = self.state.read(PRIOR_CLOSE_FILE);
        let Some(day_start) = prior.map(|p| p.total_value) else {
            return Ok(());
        };
        if policy::circuit_breaker_triggered(day_start, snapshot.total_value(), config.circuit_breaker.daily_loss_limit) {
            self.circuit_breaker_tripped_today = true;
            self.enter_defensive(snapshot, config, config.circuit_breaker.daily_loss_limit, now).await?;
        }
        Ok(())
    }

    async fn enter_defensive(
        &mut self,
        snapshot: &crate::domain::PortfolioSnapshot,
        config: &crate::config::PolicyConfig,
        trigger_loss_pct: f64,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let controller = DefensiveController::new(&self.state);
        let (actions, excess_cash) = controller.enter(snapshot, config, trigger_loss_pct, now)?;
        for action in &actions {
            if !self.dry_run {
                self.broker
                    .submit_order(&action.ticker, action.side, action.quantity, action.order_type, None)
                    .await?;
            }
            info!("defensive action: {} {} {}", action.ticker, action.quantity, action.reason);
        }
        if excess_cash > Decimal::new(1000, 0) {
            self.invoke_agent(Trigger::Defensive, &PromptBuilder::defensive(excess_cash)).await
        } else {
            info!("defensive mode: excess cash ${excess_cash:.2} below redeploy threshold, skipping agent");
            Ok(())
        }
    }

    async fn invoke_agent(&mut self, trigger: Trigger, prompt: &str) -> Result<()> {
        match self.agent.invoke(trigger, prompt).await {
            Ok(_) => {
                self.consecutive_api_failures = 0;
            }
            Err(exhausted) => {
                self.consecutive_api_failures = exhausted.consecutive_failures;
                if exhausted.should_run_fallback {
                    let snapshot = self.broker.get_portfolio().await?;
                    let config = self.config.current().clone();
                    let engine = FallbackEngine::new(&self.broker, &self.state);
                    engine
                        .run(&snapshot, &config, exhausted.consecutive_failures, |_| None)
                        .await?;
                }
            }
        }
        Ok(())
    }
}
