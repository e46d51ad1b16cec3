//! Builds a 4-bit ripple-carry adder from a full-adder integrated circuit
//! and lets the background worker evaluate it.
//!
//! Run with: `cargo run --example full_adder`
//! Set `RUST_LOG=logic_eval=debug` to watch the edits being applied.

use std::thread;
use std::time::Duration;

use logic_eval::{
    Address, BlockKind, Difference, EvalConfigBuilder, Evaluator, IcDefinition, LogicState,
    PortRef, Position,
};

const FULL_ADDER: u32 = 1;
const BITS: i32 = 4;

/// Inputs a, b, carry-in on ports 0..3. Outputs sum, carry-out on ports 0..2.
fn full_adder() -> IcDefinition {
    let blocks = Difference::new()
        .place((0, 0), BlockKind::Switch)
        .place((0, 1), BlockKind::Switch)
        .place((0, 2), BlockKind::Switch)
        .place((1, 0), BlockKind::Xor)
        .place((2, 0), BlockKind::Xor)
        .place((1, 1), BlockKind::And)
        .place((2, 1), BlockKind::And)
        .place((3, 1), BlockKind::Or)
        .connect((0, 0), (1, 0), 0)
        .connect((0, 1), (1, 0), 0)
        .connect((1, 0), (2, 0), 0)
        .connect((0, 2), (2, 0), 0)
        .connect((0, 0), (1, 1), 0)
        .connect((0, 1), (1, 1), 0)
        .connect((1, 0), (2, 1), 0)
        .connect((0, 2), (2, 1), 0)
        .connect((1, 1), (3, 1), 0)
        .connect((2, 1), (3, 1), 0);
    let port = |x, y| PortRef::new(Position::new(x, y), 0);
    IcDefinition::new(
        blocks,
        vec![port(0, 0), port(0, 1), port(0, 2)],
        vec![port(2, 0), port(3, 1)],
    )
}

/// Bit k of each operand is a switch at (0, k) and (1, k), the adder for bit
/// k sits at (3, k) and its sum light at (5, k). The final carry lights (5, 4).
fn ripple_adder() -> Difference {
    let mut diff = Difference::new().place((2, -1), BlockKind::Constant);
    for k in 0..BITS {
        diff = diff
            .place((0, k), BlockKind::Switch)
            .place((1, k), BlockKind::Switch)
            .place((3, k), BlockKind::Custom(FULL_ADDER))
            .place((5, k), BlockKind::Light)
            .connect((0, k), (3, k), 0)
            .connect((1, k), (3, k), 1)
            .connect_ports(
                PortRef::new(Position::new(3, k), 0),
                PortRef::new(Position::new(5, k), 0),
            );
        let carry_in = if k == 0 {
            PortRef::new(Position::new(2, -1), 0)
        } else {
            PortRef::new(Position::new(3, k - 1), 1)
        };
        diff = diff.connect_ports(carry_in, PortRef::new(Position::new(3, k), 2));
    }
    diff.place((5, BITS), BlockKind::Light)
        .connect_ports(
            PortRef::new(Position::new(3, BITS - 1), 1),
            PortRef::new(Position::new(5, BITS), 0),
        )
        // No carry into bit 0.
        .set_data((2, -1), 0)
}

fn at(x: i32, y: i32) -> Address {
    Address::of(Position::new(x, y))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EvalConfigBuilder::new()
        .target_tickrate(60_000)
        .start_running(true)
        .build()?;
    logic_eval::init_logging(&config.log_level);

    let mut evaluator = Evaluator::from_config(&config);
    evaluator.register_circuit(FULL_ADDER, full_adder())?;
    let summary = evaluator.make_edit(&ripple_adder(), evaluator.root_circuit())?;
    println!("applied {} modifications ({} skipped)", summary.applied, summary.skipped);

    for (a, b) in [(3u32, 5u32), (9, 7), (15, 15), (0, 6)] {
        let mut switches = Vec::new();
        let mut states = Vec::new();
        for k in 0..BITS {
            switches.push(at(0, k));
            states.push(LogicState::from_bool(a >> k & 1 == 1));
            switches.push(at(1, k));
            states.push(LogicState::from_bool(b >> k & 1 == 1));
        }
        evaluator.set_states(&switches, &states)?;
        thread::sleep(Duration::from_millis(100));

        let lights: Vec<Address> = (0..=BITS).map(|k| at(5, k)).collect();
        let mut sum = 0u32;
        for (k, state) in evaluator.get_states(&lights).into_iter().enumerate() {
            if state == Some(LogicState::High) {
                sum |= 1 << k;
            }
        }
        println!("{a:>2} + {b:>2} = {sum:>2}");
    }

    println!("{}", evaluator.stats().to_json()?);
    Ok(())
}
