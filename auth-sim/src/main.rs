// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use auth_scheduler::{Config, Procedure};
use auth_sim::{SimPlatform, Simulation};
use clap::{Parser, ValueEnum};
use consts::PAIR_CODE_LEN;
use log::info;
use std::error::Error;
use std::time::Duration;

/// RTC ticks per second.
const RTC_HZ: u64 = 32_768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Flow {
    Register,
    Login,
    Share,
    ShareCerts,
    Restore,
    Erase,
    /// Restore, register, both logins, then erase.
    All,
}

impl Flow {
    fn procedures(self) -> Vec<Procedure> {
        match self {
            Self::Register => vec![Procedure::Registration],
            Self::Login => vec![Procedure::Registration, Procedure::AdminLogin],
            Self::Share => vec![
                Procedure::Registration,
                Procedure::SharedLogin { with_certs: false },
            ],
            Self::ShareCerts => vec![
                Procedure::Registration,
                Procedure::SharedLogin { with_certs: true },
            ],
            Self::Restore => vec![Procedure::Registration, Procedure::KeyRestore],
            Self::Erase => vec![Procedure::Registration, Procedure::KeyErase],
            Self::All => vec![
                Procedure::KeyRestore,
                Procedure::Registration,
                Procedure::AdminLogin,
                Procedure::SharedLogin { with_certs: false },
                Procedure::SharedLogin { with_certs: true },
                Procedure::KeyErase,
            ],
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Runs auth procedures between a simulated device and phone")]
struct Args {
    #[arg(short, long, value_enum, default_value_t = Flow::All)]
    flow: Flow,
    /// Scheduler tick in 32.768 kHz RTC ticks
    #[arg(short, long, default_value_t = consts::SCHEDULER_INTERVAL)]
    interval: u32,
    #[arg(short, long, default_value_t = String::from("123456"))]
    pair_code: String,
    /// Type a wrong code on the device keypad
    #[arg(short, long)]
    reject: bool,
    /// Withhold this chunk of the phone's first upload
    #[arg(short, long)]
    drop_chunk: Option<u16>,
    /// Lifetime of the shared-login capability in seconds
    #[arg(short, long, default_value_t = 3_600)]
    expire_in: i64,
}

fn parse_code(code: &str) -> Result<[u8; PAIR_CODE_LEN], Box<dyn Error>> {
    let bytes: [u8; PAIR_CODE_LEN] = code
        .as_bytes()
        .try_into()
        .map_err(|_| format!("pairing code must have {PAIR_CODE_LEN} digits"))?;
    if !bytes.iter().all(u8::is_ascii_digit) {
        return Err("pairing code must be digits only".into());
    }
    Ok(bytes)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    let args = Args::parse();
    let pair_code = parse_code(&args.pair_code)?;

    let mut platform = SimPlatform::new(pair_code);
    if args.reject {
        let mut typed = pair_code;
        typed[0] = b'0' + (typed[0] - b'0' + 1) % 10;
        platform.keypad = auth_sim::Keypad::new(typed);
    }
    platform.peer.drop_upload = args.drop_chunk;
    platform.peer.capability_lifetime = args.expire_in;

    let config = Config {
        interval: args.interval,
        ..Config::default()
    };
    let mut sim = Simulation::new(platform, config);

    let period = Duration::from_micros(u64::from(args.interval.max(1)) * 1_000_000 / RTC_HZ);
    let mut ticker = tokio::time::interval(period);

    for procedure in args.flow.procedures() {
        sim.begin(procedure).map_err(|err| err.to_string())?;
        let started = sim.ticks();
        let event = loop {
            ticker.tick().await;
            if let Some(event) = sim.step() {
                break event;
            }
        };
        info!("{:?} took {} ticks", procedure, sim.ticks() - started);
        println!("{:?}: {:?}", procedure, event);
    }

    let scheduler = sim.scheduler();
    println!(
        "registered: {}, authorization: {:?}, key id: {}",
        scheduler.is_registered(),
        scheduler.authorization(),
        scheduler.key_id()
    );
    Ok(())
}
