// Entry point for the tokensend CLI
use clap::Parser;
use log::{error, info, LevelFilter};
use std::process;
use std::time::Duration;
use tokensend::core::{parse_output_script, target_from_weight, Hash256, TokenForm, TokenRef};
use tokensend::network::StreamEvent;
use tokensend::{
    Command, Config, EncryptedKeyStore, EventStream, HttpGateway, Opt, SendError, SendTokens,
    Transaction, TransactionAssembler,
};

fn main() {
    // Info level shows each pipeline stage without the per-attempt detail
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        if let Some(send_error) = e.downcast_ref::<SendError>() {
            if send_error.is_user_correctable() {
                error!("Fix the form and try again");
            } else if send_error.needs_new_credentials() {
                error!("Check the PIN and try again");
            } else if send_error.is_retriable() {
                info!("Retrying the same command may succeed");
            }
        }
        process::exit(1);
    }
}

fn run_command(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(opt.config.as_deref())?;
    let network = config.node.network;

    match opt.command {
        Command::CreateKey { pin } => {
            let mut store = EncryptedKeyStore::open(&config.keystore, network)?;
            let address = store.create_key(&pin)?;
            println!("Your new address: {address}");
        }
        Command::ListAddresses => {
            let store = EncryptedKeyStore::open(&config.keystore, network)?;
            for address in store.get_addresses() {
                println!("{address}")
            }
        }
        Command::Target { weight } => {
            let target = target_from_weight(weight)?;
            println!("{:064x}", target);
        }
        Command::Decode { hex } => {
            let tx = Transaction::from_hex(hex.trim())?;
            print_transaction(&tx, network)?;
        }
        Command::Send {
            inputs,
            outputs,
            token,
            dry_run,
            pin,
        } => {
            let token = match token {
                Some(uid) => TokenRef::Custom(Hash256::from_hex(&uid)?),
                None => TokenRef::Native,
            };
            let mut form = TokenForm::new(token);
            for input in inputs {
                form = form.with_input(input.0);
            }
            for output in outputs {
                form = form.with_output(output.0);
            }
            let mut assembler = TransactionAssembler::new(network);
            assembler.add_token_form(form);

            let store = EncryptedKeyStore::open(&config.keystore, network)?;
            let gateway = HttpGateway::new(
                &config.node.url,
                Duration::from_millis(config.node.timeout_ms),
            )?;
            let mut pipeline =
                SendTokens::from_config(&config, Box::new(store), Box::new(gateway))?;

            // A dry run stops after mining so the hex can be inspected or pushed elsewhere
            let prepared = pipeline.prepare(&assembler, &pin)?;
            if dry_run {
                println!("{}", prepared.tx_hex);
                return Ok(());
            }
            let receipt = pipeline.submit(&prepared)?;
            println!(
                "Transaction sent: {}",
                receipt.tx_hash.unwrap_or_else(|| prepared.hash_hex())
            );
            if let Some(message) = receipt.message {
                println!("Node says: {message}");
            }
        }
        Command::Watch { addresses } => {
            let addresses = if addresses.is_empty() {
                EncryptedKeyStore::open(&config.keystore, network)?.get_addresses()
            } else {
                addresses
            };
            if addresses.is_empty() {
                return Err("No addresses to watch. Use 'createkey' or pass --address".into());
            }
            info!("Watching {} addresses on {}", addresses.len(), config.node.ws_url);

            let stream = EventStream::connect(&config.node.ws_url, addresses)?;
            while let Some(event) = stream.recv() {
                match event {
                    StreamEvent::StateChanged(state) => println!("[{state:?}]"),
                    StreamEvent::Message { kind, payload, .. } => println!("{kind}: {payload}"),
                }
            }
        }
    }
    Ok(())
}

fn print_transaction(
    tx: &Transaction,
    network: tokensend::core::Network,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Hash: {}", Hash256::new(tx.hash()?).to_hex());
    println!("Version: {}", tx.get_version());
    println!("Weight: {}", tx.get_weight());
    println!("Timestamp: {}", tx.get_timestamp());
    println!("Nonce: {}", tx.get_nonce());
    println!("Proof of work valid: {}", tokensend::core::proof_of_work::validate(tx)?);

    for (i, uid) in tx.get_tokens().iter().enumerate() {
        println!("- Token {} = {}", i + 1, uid.to_hex());
    }
    for input in tx.get_inputs() {
        println!(
            "-- Input tx_id = {}, index = {}, data = {} bytes",
            input.get_tx_id().to_hex(),
            input.get_index(),
            input.get_data().len(),
        )
    }
    for output in tx.get_outputs() {
        let destination = match parse_output_script(output.get_script(), network) {
            Some((address, Some(timelock))) => {
                format!("{} (locked until {timelock})", address.encode())
            }
            Some((address, None)) => address.encode(),
            None => "<non-standard script>".to_string(),
        };
        println!(
            "-- Output value = {}, token = {}, to = {}",
            output.get_value(),
            output.get_token_index(),
            destination,
        )
    }
    for parent in tx.get_parents() {
        println!("- Parent {}", parent.to_hex());
    }
    Ok(())
}
