mod audio; // acoustic device I/O
mod bridge; // front-end bridge
mod buffers; // buffered half-duplex stream
mod config;
mod errors;
mod fec; // Reed-Solomon chunk codec
mod logging;
mod modem; // tone modem
mod session; // encrypted session
mod transceiver; // reliable transceiver
mod types;

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cpal::traits::HostTrait;

use bridge::{FrontEnd, ReceivedData};
use buffers::BufferedStream;
use config::Config;
use logging::{LogLevel, LogSink};
use modem::ToneModem;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let log = if args.iter().any(|a| a == "--disable-log") {
        LogSink::disabled()
    } else {
        LogSink::new(LogLevel::Info)
    };
    let config = Config::default();

    loop {
        print!("Select mode [sender / receiver]: ");
        std::io::stdout().flush()?;
        let mut mode = String::new();
        std::io::stdin().read_line(&mut mode)?;

        match mode.trim().to_lowercase().as_str() {
            "s" | "sn" | "snd" | "send" | "sender" => return run_peer(true, log, config),
            "r" | "re" | "rec" | "recv" | "receiver" => return run_peer(false, log, config),
            _ => println!("Invalid mode"),
        }
    }
}

/// Sets up the audio/modem/transport stack for one end of a session, then
/// drives the sender's "enter text to send" prompt loop or the receiver's
/// "print whatever arrives" loop. Grounded in `alternative.py`'s top-level
/// `sender()`/`receiver()` entry points.
fn run_peer(is_sender: bool, log: LogSink, config: Config) -> Result<()> {
    let host = cpal::default_host();
    let input_dev = host.default_input_device().context("no default input device")?;
    let output_dev = host.default_output_device().context("no default output device")?;

    let mic = audio::Mic::start(&input_dev)?;
    let speaker = audio::Speaker::start(&output_dev)?;
    let sample_rate = speaker.params.sample_rate;

    let stream = Arc::new(BufferedStream::new(is_sender));
    let modem = Arc::new(ToneModem::new(sample_rate, 0.8));
    let running = Arc::new(AtomicBool::new(true));
    let receiving = Arc::new(AtomicBool::new(false));

    {
        let stream = stream.clone();
        let modem = modem.clone();
        let running = running.clone();
        let receiving = receiving.clone();
        let log = log.clone();
        let config = config.clone();
        thread::spawn(move || mic_reader_loop(mic, stream, modem, receiving, running, log, config));
    }
    {
        let stream = stream.clone();
        let modem = modem.clone();
        let running = running.clone();
        let receiving = receiving.clone();
        let config = config.clone();
        thread::spawn(move || speaker_writer_loop(speaker, stream, modem, receiving, running, is_sender, config));
    }

    let mut transceiver = transceiver::Transceiver::new(stream.clone(), config.clone(), log.clone());
    let key = if is_sender {
        transceiver.connect_init_sender();
        log.info("main", "initial handshake complete, exchanging keys...");
        session::key_exchange_sender(&mut transceiver, &config, &log)?
    } else {
        transceiver.connect_init_receiver();
        log.info("main", "initial handshake complete, exchanging keys...");
        session::key_exchange_receiver(&mut transceiver, &config, &log)?
    };

    let mut bridge = FrontEnd::new(transceiver, key, config, log.clone());

    let result = if is_sender {
        sender_prompt_loop(&mut bridge)
    } else {
        receiver_print_loop(&mut bridge)
    };

    running.store(false, Ordering::Relaxed);
    result
}

fn sender_prompt_loop(bridge: &mut FrontEnd) -> Result<()> {
    loop {
        print!("Enter a message to send (or 'quit'): ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        let line = line.trim_end();

        if line.eq_ignore_ascii_case("quit") {
            return Ok(());
        }

        bridge.send_text(line)?;
        println!("Sent.");
    }
}

fn receiver_print_loop(bridge: &mut FrontEnd) -> Result<()> {
    loop {
        match bridge.receive()? {
            ReceivedData::Text(text) => println!("Received text: {text}"),
            binary @ ReceivedData::Binary(_) => println!("Received binary data: {}", binary.as_display()),
        }
    }
}

/// Prepends a 1-byte length header to `frame`, forward-error-corrects it,
/// and hands the result to the modem for modulation.
fn prepare_for_air(modem: &ToneModem, frame: &[u8]) -> Vec<f32> {
    let mut with_len = Vec::with_capacity(1 + frame.len());
    with_len.push(frame.len() as u8);
    with_len.extend_from_slice(frame);
    let fec_encoded = fec::encode(&with_len);
    modem.encode(&fec_encoded)
}

/// Reverses [`prepare_for_air`]: strips FEC, then the in-band length byte.
fn recover_from_air(fec_encoded: &[u8]) -> Option<Vec<u8>> {
    let decoded = fec::decode_full(fec_encoded).ok()?;
    let len = *decoded.first()? as usize;
    decoded.get(1..1 + len).map(|s| s.to_vec())
}

/// Mic-reader loop (thread 1 of the scheduling model): feeds captured samples to the
/// modem, appending any fully decoded, FEC-corrected frame to the buffered
/// stream's input side.
fn mic_reader_loop(
    mic: audio::Mic,
    stream: Arc<BufferedStream>,
    modem: Arc<ToneModem>,
    receiving: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    log: LogSink,
    config: Config,
) {
    let mut rolling: Vec<f32> = Vec::new();
    let mut receiving_since: Option<Instant> = None;

    while running.load(Ordering::Relaxed) {
        if !stream.can_read() {
            rolling.clear();
            receiving.store(false, Ordering::Relaxed);
            receiving_since = None;
            thread::sleep(config.read_precision);
            continue;
        }

        rolling.extend(mic.drain());

        match modem.decode(&rolling) {
            Some(fec_encoded) => {
                receiving.store(false, Ordering::Relaxed);
                receiving_since = None;
                match recover_from_air(&fec_encoded) {
                    Some(frame) => stream.push_input(&frame),
                    None => log.warning("modem", "dropped a frame: FEC could not correct it"),
                }
                rolling.clear();
                thread::sleep(config.post_decode_settle);
            }
            None => {
                if modem.is_receiving(&rolling) {
                    receiving.store(true, Ordering::Relaxed);
                    let since = *receiving_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= config.max_receiving_time {
                        log.warning("modem", "forced reception stop: false lock recovery");
                        rolling.clear();
                        receiving.store(false, Ordering::Relaxed);
                        receiving_since = None;
                    }
                } else {
                    receiving.store(false, Ordering::Relaxed);
                    receiving_since = None;
                    // Bound unbounded growth from ambient noise with no marker in sight.
                    if rolling.len() > mic.params.sample_rate as usize * 2 {
                        rolling.clear();
                    }
                }
                thread::sleep(config.read_precision);
            }
        }
    }
}

/// Speaker-writer loop (thread 2 of the scheduling model): emits modulated samples during
/// this peer's send-window slot, otherwise lets the output stream fall back
/// to silence.
fn speaker_writer_loop(
    speaker: audio::Speaker,
    stream: Arc<BufferedStream>,
    modem: Arc<ToneModem>,
    receiving: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    is_sender: bool,
    config: Config,
) {
    let window = if is_sender { config.sender_window } else { config.receiver_window };

    while running.load(Ordering::Relaxed) {
        if !stream.can_write() || receiving.load(Ordering::Relaxed) {
            thread::sleep(config.read_precision);
            continue;
        }

        if let Some(anchor) = stream.first_packet_time() {
            if !in_send_window(anchor, window) {
                thread::sleep(config.read_precision);
                continue;
            }
        }

        match stream.pop_output() {
            Some(frame) => speaker.play(&prepare_for_air(&modem, &frame)),
            None => thread::sleep(config.read_precision),
        }
    }
}

fn in_send_window(anchor: Instant, window: (Duration, Duration)) -> bool {
    let elapsed = anchor.elapsed().as_millis() as u64 % 1000;
    let (start, end) = (window.0.as_millis() as u64, window.1.as_millis() as u64);
    elapsed >= start && elapsed < end
}
