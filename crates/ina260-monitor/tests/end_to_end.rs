use i2c_transport::{I2cAddress, I2cBus, MockBus, MockHandle, Transaction};
use ina260_monitor::{
    attach, parse_address, parse_channel, ConfigFile, MetricsHub, Poller, Quantity,
    RecordingSink, Register,
};

fn scripted_bus(mux: I2cAddress, dev: I2cAddress, ids: (u16, u16)) -> anyhow::Result<(MockBus, MockHandle)> {
    let bus = MockBus::open("mock0")?;
    let h = bus.handle();
    h.add_latch(mux);
    h.set_register(dev, Register::ManufacturerId.addr(), ids.0);
    h.set_register(dev, Register::DeviceId.addr(), ids.1);
    h.set_register(dev, Register::Current.addr(), 0x0010);
    h.set_register(dev, Register::BusVoltage.addr(), 0x0190);
    h.set_register(dev, Register::Power.addr(), 0x0064);
    Ok((bus, h))
}

#[test]
fn publishes_labeled_samples_for_channel_three() -> anyhow::Result<()> {
    let file = ConfigFile {
        channel: Some(i64::from(parse_channel("3")?.get())),
        ..Default::default()
    };
    let cfg = file.resolve("pi-lab")?;
    assert_eq!(cfg.mux, parse_address("0x70")?);

    let (bus, h) = scripted_bus(cfg.mux, cfg.device, (0x5449, 0x2260))?;
    let session = attach(bus, cfg.multiplexer(), cfg.channel, cfg.device)?;
    assert_eq!(
        h.transactions()[0],
        Transaction::Write {
            addr: 0x70,
            bytes: vec![0b0000_1000]
        }
    );

    let sink = RecordingSink::new();
    let mut poller = Poller::new(session, sink.clone(), cfg.labels(), std::time::Duration::ZERO);
    poller.run_cycles(1);

    let samples = sink.samples();
    assert_eq!(samples.len(), 3);
    for s in &samples {
        assert_eq!(s.labels.device, "tca0x70_ch3_ina260");
        assert_eq!(s.labels.hostname, "pi-lab");
        let expected = match s.quantity {
            Quantity::Current => 0.02,
            Quantity::Voltage => 0.5,
            Quantity::Power => 1.0,
        };
        assert!((s.value - expected).abs() < 1e-9, "{}", s.name());
    }
    Ok(())
}

#[test]
fn identity_mismatch_does_not_stop_polling() -> anyhow::Result<()> {
    let cfg = ConfigFile::default().resolve("pi-lab")?;
    let (bus, h) = scripted_bus(cfg.mux, cfg.device, (0x0000, 0xFFFF))?;
    let session = attach(bus, cfg.multiplexer(), cfg.channel, cfg.device)?;

    let hub = MetricsHub::new()?;
    let mut poller = Poller::new(session, hub.clone(), cfg.labels(), std::time::Duration::ZERO);
    h.fail_next(1);
    poller.run_cycles(3);

    let text = hub.encode_text();
    assert!(text.contains(r#"power{device="tca0x70_ch0_ina260",hostname="pi-lab"} 1"#));
    assert!(text.contains(
        r#"ina260_read_errors_total{device="tca0x70_ch0_ina260",hostname="pi-lab"} 1"#
    ));
    Ok(())
}

#[test]
fn bad_channel_never_reaches_the_bus() -> anyhow::Result<()> {
    let mut bus = MockBus::open("mock0")?;
    let h = bus.handle();
    let mux = parse_address("0x70")?;
    h.add_latch(mux);
    for raw in [-1i64, 8, 255] {
        let res = ina260_monitor::mux::select_channel(&mut bus, mux, raw);
        assert!(res.map_err(|e| e.is_config()).err().unwrap_or(false));
    }
    assert!(h.transactions().is_empty());
    // The bus is still usable afterwards.
    bus.write(mux, &[0x01])?;
    assert_eq!(h.latch(mux), Some(0x01));
    Ok(())
}
