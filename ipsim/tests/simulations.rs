use ipsim::simulations::{self, Params, Scenario, CLIENT_ADDRESS};
use ipsim_core::{
    protocols::ipv4::icmp::{IcmpError, TimeExceededCode, UnreachableCode},
    ExitStatus,
};
use std::time::Duration;

#[test]
fn fragmented_transfer() -> anyhow::Result<()> {
    let run = simulations::fragmented_transfer(&Params::default())?;
    assert_eq!(run.status, ExitStatus::Completed);
    assert_eq!(run.intact_deliveries(), 1);

    let delivered = run.internet.delivered(run.server);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].source(), CLIENT_ADDRESS);
    assert_eq!(delivered[0].total_length(), 4020);

    let client = run.internet.router(run.client).map(|r| r.stats());
    let router = run.internet.router(run.router).map(|r| r.stats());
    let server = run.internet.router(run.server).map(|r| r.stats());
    // 1480, 1480 and 1040 bytes of data leave the client
    assert_eq!(client.map(|s| s.fragments_created), Some(3));
    // Each is split again for the bottleneck, into 3, 3 and 2
    assert_eq!(router.map(|s| s.fragments_created), Some(8));
    assert_eq!(server.map(|s| s.reassembled), Some(1));
    Ok(())
}

#[test]
fn fits_without_fragmenting() -> anyhow::Result<()> {
    let params = Params {
        payload_size: 500,
        ..Default::default()
    };
    let run = simulations::fragmented_transfer(&params)?;
    assert_eq!(run.intact_deliveries(), 1);
    let router = run.internet.router(run.router).map(|r| r.stats());
    assert_eq!(router.map(|s| s.fragments_created), Some(0));
    Ok(())
}

#[test]
fn ttl_expiry() -> anyhow::Result<()> {
    let run = simulations::ttl_expiry(&Params::default())?;
    assert!(run.internet.delivered(run.server).is_empty());
    let errors = run.internet.errors(run.router);
    // One report per fragment the router made for the bottleneck
    assert_eq!(errors.len(), 8);
    assert!(errors
        .iter()
        .all(|e| *e == IcmpError::TimeExceeded(TimeExceededCode::TtlExpired)));
    Ok(())
}

#[test]
fn dont_fragment_at_the_router() -> anyhow::Result<()> {
    let params = Params {
        payload_size: 1000,
        ..Default::default()
    };
    let run = simulations::dont_fragment(&params)?;
    assert!(run.internet.delivered(run.server).is_empty());
    assert!(run.internet.errors(run.client).is_empty());
    assert_eq!(
        run.internet.errors(run.router),
        vec![IcmpError::DestinationUnreachable(
            UnreachableCode::FragmentationNeeded
        )]
    );
    Ok(())
}

#[test]
fn dont_fragment_at_the_client() -> anyhow::Result<()> {
    let run = simulations::dont_fragment(&Params::default())?;
    assert!(run.internet.trace().iter().all(|t| t.node == run.client));
    assert_eq!(
        run.internet.errors(run.client),
        vec![IcmpError::DestinationUnreachable(
            UnreachableCode::FragmentationNeeded
        )]
    );
    Ok(())
}

#[test]
fn reassembly_timeout() -> anyhow::Result<()> {
    let run = simulations::reassembly_timeout(&Params::default())?;
    assert_eq!(run.internet.lost(), 1);
    assert!(run.internet.delivered(run.server).is_empty());
    assert_eq!(
        run.internet.errors(run.server),
        vec![IcmpError::TimeExceeded(TimeExceededCode::ReassemblyTimeout)]
    );
    let server = run.internet.router(run.server);
    assert_eq!(server.map(|r| r.pending_reassemblies()), Some(0));
    assert_eq!(server.map(|r| r.stats().reassembly_timeouts), Some(1));
    Ok(())
}

#[test]
fn lossless_stream() -> anyhow::Result<()> {
    let params = Params {
        messages: 10,
        ..Default::default()
    };
    let run = simulations::lossy_transfer(&params)?;
    assert_eq!(run.intact_deliveries(), 10);
    assert_eq!(run.internet.lost(), 0);
    Ok(())
}

#[test]
fn total_loss() -> anyhow::Result<()> {
    let params = Params {
        messages: 10,
        loss_rate: 1.0,
        ..Default::default()
    };
    let run = simulations::lossy_transfer(&params)?;
    assert_eq!(run.intact_deliveries(), 0);
    // Every fragment on the bottleneck
    assert_eq!(run.internet.lost(), 80);
    assert!(run.internet.errors(run.server).is_empty());
    Ok(())
}

#[test]
fn same_seed_same_run() -> anyhow::Result<()> {
    let params = Params {
        messages: 20,
        loss_rate: 0.1,
        bit_error_rate: 0.2,
        ..Default::default()
    };
    let first = Scenario::Lossy.run(&params)?;
    let second = Scenario::Lossy.run(&params)?;
    assert_eq!(first.internet.trace(), second.internet.trace());
    assert!(first.intact_deliveries() <= 20);
    Ok(())
}

#[test]
fn deadline_cuts_the_run_short() -> anyhow::Result<()> {
    let params = Params {
        deadline: Some(Duration::from_millis(1)),
        ..Default::default()
    };
    let run = simulations::fragmented_transfer(&params)?;
    assert_eq!(run.status, ExitStatus::TimedOut);
    assert!(run.internet.delivered(run.server).is_empty());
    Ok(())
}

#[test]
fn summary_mentions_every_node() -> anyhow::Result<()> {
    let run = simulations::ttl_expiry(&Params::default())?;
    let summary = run.to_string();
    for name in ["client", "router", "server"] {
        assert!(summary.contains(name));
    }
    assert!(summary.contains("router reported"));
    Ok(())
}
