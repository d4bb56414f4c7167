mod common;

use std::fs;

use csound_api::{
    BridgeError, ChannelBehavior, ChannelHints, ChannelType, HostConfig, HostData, ListKind,
    MessageAttributes, Status, VariableValue,
};
use csound_testkit::{ScriptedHost, API_VERSION, OPCODES, UTILITIES, VERSION};

use common::{host, init_logging, ORCHESTRA};

#[test]
fn engine_constants() {
    assert_eq!(ScriptedHost::version(), VERSION);
    assert_eq!(ScriptedHost::api_version(), API_VERSION);
    assert_eq!(ScriptedHost::size_of_myflt(), 8);
}

#[test]
fn destroyed_handles_stay_invalid() {
    let (mut host, first) = host();
    host.destroy(first).unwrap();
    assert!(matches!(host.destroy(first), Err(BridgeError::UnknownInstance(id)) if id == first));

    let second = host.create(HostData::none()).unwrap();
    assert_ne!(first, second);
    assert!(matches!(host.sr(first), Err(BridgeError::UnknownInstance(_))));
    assert!(host.sr(second).is_ok());
    assert_eq!(host.instances(), [second]);
}

#[test]
fn configured_options_apply_to_new_instances() {
    init_logging();
    let config =
        HostConfig::from_toml_str("options = [\"--ksmps=20\"]\nmessage_level = 4\n").unwrap();
    let mut host = ScriptedHost::new(config);
    let id = host.create(HostData::none()).unwrap();
    host.compile_orc(id, "sr = 1000\n").unwrap();
    assert_eq!(host.ksmps(id).unwrap(), 20);
    assert_eq!(host.kr(id).unwrap(), 50.0);
    assert_eq!(host.message_level(id).unwrap(), 4);
}

#[test]
fn interior_nul_is_rejected_before_the_engine() {
    let (host, id) = host();
    let err = host.compile_orc(id, "instr 1\0\nendin\n").unwrap_err();
    assert!(matches!(err, BridgeError::InvalidArgument { name: "orchestra", .. }));
    assert!(matches!(
        host.score_event(id, 'é', &[1.0, 0.0, 1.0]),
        Err(BridgeError::InvalidArgument { name: "kind", .. })
    ));
}

#[test]
fn engine_errors_are_statuses() {
    let (host, id) = host();
    assert_eq!(host.compile_orc(id, "instr 1\n").unwrap(), Status::ERROR);
    assert_eq!(host.read_score(id, "x 1 2 3\n").unwrap(), Status::ERROR);
    assert_eq!(host.score_event(id, 'z', &[]).unwrap(), Status::ERROR);
    assert_eq!(host.start(id).unwrap(), Status::INITIALIZATION);
}

#[test]
fn parsed_tree_is_an_owned_copy() {
    let (host, id) = host();
    let mut tree = host.parse_orc(id, ORCHESTRA).unwrap().unwrap();

    let statements: Vec<i32> = tree.root().siblings().map(|node| node.kind).collect();
    assert_eq!(statements, [b'=' as i32, b'=' as i32, 258]);
    let first = tree.root();
    assert_eq!(first.left.as_ref().unwrap().lexeme(), Some("sr"));
    assert_eq!(first.right.as_ref().unwrap().value.as_ref().unwrap().value, 100);

    assert_eq!(host.compile_tree(id, &tree).unwrap(), Status::SUCCESS);
    assert_eq!(host.sr(id).unwrap(), 100.0);

    host.delete_tree(id, &mut tree).unwrap();
    assert!(tree.is_released());
    host.delete_tree(id, &mut tree).unwrap();
    assert!(matches!(host.compile_tree(id, &tree), Err(BridgeError::TreeReleased)));
    assert_eq!(tree.root().line, 1);
    assert_eq!(host.engine(id).unwrap().live_allocations(), 0);
}

#[test]
fn unparseable_orchestra_yields_no_tree() {
    let (host, id) = host();
    assert!(host.parse_orc(id, "endin\n").unwrap().is_none());
    assert!(host.parse_orc(id, "").unwrap().is_none());
}

#[test]
fn handles_are_tied_to_their_instance() {
    let (mut host, a) = host();
    let b = host.create(HostData::none()).unwrap();
    let mut tree = host.parse_orc(a, ORCHESTRA).unwrap().unwrap();
    assert!(matches!(
        host.compile_tree(b, &tree),
        Err(BridgeError::ForeignHandle { owner, used_with, .. }) if owner == a && used_with == b
    ));
    let (_, mut opcodes) = host.new_opcode_list(a).unwrap();
    assert!(matches!(
        host.dispose_opcode_list(b, &mut opcodes),
        Err(BridgeError::ForeignHandle { .. })
    ));

    host.delete_tree(a, &mut tree).unwrap();
    host.dispose_opcode_list(a, &mut opcodes).unwrap();
}

#[test]
fn eval_code_compiles_and_returns() {
    let (host, id) = host();
    assert_eq!(host.eval_code(id, "instr 5\nendin\nreturn 6 / 4\n").unwrap(), 1.5);
    assert_eq!(host.eval_code(id, "instr\n").unwrap(), 0.0);
}

#[test]
fn compile_csd_from_file() {
    let (host, id) = host();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("piece.csd");
    fs::write(
        &path,
        concat!(
            "<CsoundSynthesizer>\n<CsOptions>\n-d -m0\n</CsOptions>\n",
            "<CsInstruments>\nsr = 200\nksmps = 20\ninstr 1\nendin\n</CsInstruments>\n",
            "<CsScore>\ni 1 0 1\n</CsScore>\n</CsoundSynthesizer>\n",
        ),
    )
    .unwrap();

    assert_eq!(host.compile_csd(id, path.to_str().unwrap()).unwrap(), Status::SUCCESS);
    assert_eq!(host.sr(id).unwrap(), 200.0);
    assert_eq!(host.message_level(id).unwrap(), 0);
    assert_eq!(host.start(id).unwrap(), Status::SUCCESS);
    assert!(host.perform(id).unwrap() > 0);
    assert_eq!(host.score_time(id).unwrap(), 1.0);

    assert_eq!(host.compile_csd(id, "/nonexistent/piece.csd").unwrap(), Status::ERROR);
}

#[test]
fn compile_from_arguments() {
    let (host, id) = host();
    let dir = tempfile::tempdir().unwrap();
    let orc = dir.path().join("piece.orc");
    let sco = dir.path().join("piece.sco");
    fs::write(&orc, ORCHESTRA).unwrap();
    fs::write(&sco, "i 1 0 0.3\n").unwrap();

    let status = host
        .compile(id, &["csound", "-n", orc.to_str().unwrap(), sco.to_str().unwrap()])
        .unwrap();
    assert_eq!(status, Status::SUCCESS);
    let mut periods = 0;
    while !host.perform_ksmps(id).unwrap() {
        periods += 1;
    }
    assert_eq!(periods, 3);
    assert_eq!(host.compile_args(id, &["csound"]).unwrap(), Status::ERROR);
}

#[test]
fn buffer_performance_covers_whole_periods() {
    let (host, id) = host();
    host.set_option(id, "-b25").unwrap();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 1\n").unwrap();
    host.start(id).unwrap();
    assert!(!host.perform_buffer(id).unwrap());
    assert_eq!(host.current_time_samples(id).unwrap(), 30);
}

#[test]
fn score_offset_and_rewind() {
    let (host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 2\n").unwrap();
    host.set_score_offset_seconds(id, 1.5).unwrap();
    host.start(id).unwrap();
    assert_eq!(host.score_time(id).unwrap(), 1.5);
    assert_eq!(host.score_offset_seconds(id).unwrap(), 1.5);

    host.set_score_offset_seconds(id, 0.0).unwrap();
    host.rewind_score(id).unwrap();
    assert_eq!(host.current_time_samples(id).unwrap(), 0);
    assert!(host.is_score_pending(id).unwrap());
}

#[test]
fn score_events_are_relative_to_now() {
    let (host, id) = host();
    host.compile_orc(id, ORCHESTRA).unwrap();
    host.read_score(id, "i 1 0 0.2\n").unwrap();
    host.start(id).unwrap();
    host.perform_ksmps(id).unwrap();
    host.perform_ksmps(id).unwrap();

    assert_eq!(host.score_event(id, 'i', &[1.0, 0.0, 0.2]).unwrap(), Status::SUCCESS);
    assert_eq!(host.input_message(id, "i 1 0.1 0.1\n").unwrap(), Status::SUCCESS);
    let mut periods = 0;
    while !host.perform_ksmps(id).unwrap() {
        periods += 1;
    }
    assert_eq!(periods, 2);
}

#[test]
fn output_settings() {
    let (host, id) = host();
    assert_eq!(host.output_name(id).unwrap(), None);
    host.set_output(id, "take.aiff", Some("aiff"), Some("float")).unwrap();
    assert_eq!(host.output_name(id).unwrap().as_deref(), Some("take.aiff"));
    assert_eq!(host.set_option(id, "-odac").unwrap(), Status::SUCCESS);
    assert_eq!(host.output_name(id).unwrap().as_deref(), Some("dac"));

    assert!(!host.debug(id).unwrap());
    host.set_debug(id, true).unwrap();
    assert!(host.debug(id).unwrap());
}

#[test]
fn message_buffer_round_trip() {
    let (host, id) = host();
    host.create_message_buffer(id, false).unwrap();
    host.message(id, "plain\n").unwrap();
    host.message_s(id, MessageAttributes::WARNING, "careful\n").unwrap();

    assert_eq!(host.message_count(id).unwrap(), 2);
    assert_eq!(host.first_message(id).unwrap().as_deref(), Some("plain\n"));
    assert_eq!(host.first_message_attributes(id).unwrap(), MessageAttributes::DEFAULT);
    host.pop_first_message(id).unwrap();
    assert_eq!(host.first_message(id).unwrap().as_deref(), Some("careful\n"));
    assert_eq!(host.first_message_attributes(id).unwrap(), MessageAttributes::WARNING);

    host.destroy_message_buffer(id).unwrap();
    assert_eq!(host.message_count(id).unwrap(), 0);
    assert_eq!(host.first_message(id).unwrap(), None);
}

#[test]
fn channel_hints_survive_a_round_trip() {
    let (host, id) = host();
    host.compile_orc(id, "chn_k \"cutoff\", 1\ninstr 1\nendin\n").unwrap();
    let hints = ChannelHints {
        behavior: ChannelBehavior::Exponential,
        default: 1000.0,
        min: 20.0,
        max: 20000.0,
        width: 120,
        height: 20,
        attributes: Some("unit=Hz".to_string()),
        ..ChannelHints::default()
    };
    assert_eq!(host.set_control_channel_hints(id, "cutoff", &hints).unwrap(), Status::SUCCESS);

    let (status, read) = host.control_channel_hints(id, "cutoff").unwrap();
    assert_eq!(status, Status::SUCCESS);
    assert_eq!(read, Some(hints.clone()));

    let (count, mut list) = host.list_channels(id).unwrap();
    assert_eq!(count, 1);
    assert_eq!(list.kind(), ListKind::Channels);
    let channel = &list[0];
    assert_eq!(channel.name, "cutoff");
    assert_eq!(channel.channel_type.data_type(), ChannelType::CONTROL);
    assert!(channel.channel_type.is_input());
    assert!(!channel.channel_type.is_output());
    assert_eq!(channel.hints, hints);
    host.delete_channel_list(id, &mut list).unwrap();
    assert!(list.is_released());
    assert!(list.is_empty());

    let (status, missing) = host.control_channel_hints(id, "resonance").unwrap();
    assert_eq!(status, Status::ERROR);
    assert_eq!(missing, None);
}

#[test]
fn control_channel_value_round_trip() {
    let (host, id) = host();
    host.set_control_channel(id, "pitch", 440.0).unwrap();
    let read = host.control_channel(id, "pitch").unwrap();
    assert_eq!(read.value, 440.0);
    assert_eq!(read.status, Status::SUCCESS);

    let missing = host.control_channel(id, "volume").unwrap();
    assert_eq!(missing.status, Status::ERROR);
}

#[test]
fn empty_channel_list() {
    let (host, id) = host();
    let (count, mut list) = host.list_channels(id).unwrap();
    assert_eq!(count, 0);
    assert!(list.is_empty());
    host.delete_channel_list(id, &mut list).unwrap();
}

#[test]
fn opcode_and_utility_lists() {
    let (host, id) = host();
    let (count, mut opcodes) = host.new_opcode_list(id).unwrap();
    assert_eq!(count as usize, OPCODES.len());
    let oscili = opcodes.iter().find(|entry| entry.name == "oscili").unwrap();
    assert_eq!(oscili.output_types, "a");
    assert_eq!(oscili.input_types, "kkjo");
    host.dispose_opcode_list(id, &mut opcodes).unwrap();
    host.dispose_opcode_list(id, &mut opcodes).unwrap();

    let mut utilities = host.list_utilities(id).unwrap();
    assert_eq!(utilities.len(), UTILITIES.len());
    assert_eq!(utilities[0], "atsa");
    assert_eq!(
        host.utility_description(id, "sndinfo").unwrap().as_deref(),
        Some("Prints information about sound files")
    );
    assert_eq!(host.utility_description(id, "nope").unwrap(), None);
    host.delete_utility_list(id, &mut utilities).unwrap();
    assert_eq!(host.engine(id).unwrap().live_allocations(), 0);
}

#[test]
fn global_environment_reaches_new_instances() {
    let (mut host, before) = host();
    assert_eq!(
        ScriptedHost::set_global_env("CSOUND_TEST_SFDIR", "/tmp/out").unwrap(),
        Status::SUCCESS
    );
    let after = host.create(HostData::none()).unwrap();
    assert_eq!(host.env(after, "CSOUND_TEST_SFDIR").unwrap().as_deref(), Some("/tmp/out"));
    assert_eq!(host.env(before, "CSOUND_TEST_SFDIR").unwrap(), None);
    assert_eq!(ScriptedHost::set_global_env("", "x").unwrap(), Status::ERROR);
}

#[test]
fn breakpoint_runs_inline_during_synchronous_performance() {
    let (mut host, id) = host();
    host.compile_orc(
        id,
        concat!(
            "sr = 100\nksmps = 10\ninstr 1\nifreq = p4\nSname = \"lead\"\n",
            "asig oscili 0.5, ifreq\nendin\n",
        ),
    )
    .unwrap();
    host.read_score(id, "i 1 0 1 440\n").unwrap();

    let (sender, hits) = std::sync::mpsc::channel();
    host.set_breakpoint_callback(id, move |info| {
        let _ = sender.send(info.clone());
    })
    .unwrap();
    host.debugger_init(id).unwrap();
    host.set_instrument_breakpoint(id, 1.0, 0).unwrap();
    assert!(matches!(
        host.set_instrument_breakpoint(id, 1.0, -1),
        Err(BridgeError::InvalidArgument { name: "skip", .. })
    ));
    host.start(id).unwrap();

    assert!(!host.perform_ksmps(id).unwrap());
    let info = hits.try_recv().unwrap();
    let instrument = info.instrument.as_ref().unwrap();
    assert_eq!(instrument.p1, 1.0);
    assert_eq!(instrument.kcounter, 0);
    assert_eq!(info.active_instruments.len(), 1);
    assert_eq!(info.variable("ifreq"), Some(&VariableValue::Number(440.0)));
    assert_eq!(info.variable("Sname"), Some(&VariableValue::Text("lead".into())));
    assert_eq!(info.current_opcode.as_ref().unwrap().name, "oscili");

    // Paused at the breakpoint until told to continue.
    assert!(!host.perform_ksmps(id).unwrap());
    assert!(hits.try_recv().is_err());
    host.remove_instrument_breakpoint(id, 1.0).unwrap();
    host.debug_continue(id).unwrap();
    assert!(!host.perform_ksmps(id).unwrap());
    assert_eq!(host.current_time_samples(id).unwrap(), 20);

    host.debugger_clean(id).unwrap();
    assert!(host.perform(id).unwrap() > 0);
    assert!(hits.try_recv().is_err());
}

#[test]
fn cleanup_and_reset() {
    let (host, id) = host();
    host.compile_orc(id, "sr = 200\ninstr 1\nendin\n").unwrap();
    host.start(id).unwrap();
    assert_eq!(host.cleanup(id).unwrap(), Status::SUCCESS);
    host.reset(id).unwrap();
    assert_eq!(host.sr(id).unwrap(), 44100.0);
    assert_eq!(host.start(id).unwrap(), Status::INITIALIZATION);
}
