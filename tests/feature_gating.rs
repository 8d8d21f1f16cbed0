mod common;

use backflow::error::Result;
use backflow::pipeline::chain::PipeExt;
use backflow::pipeline::runtime::Runtime;
use common::{collected, CollectSink, VecSource};

#[test]
fn tracing_feature_gating_compiles() {
    #[cfg(feature = "tracing")]
    {
        tracing::event!(
            tracing::Level::DEBUG,
            event = "backflow.test.feature_gating",
            "backflow.test.feature_gating"
        );
    }

    #[cfg(not(feature = "tracing"))]
    {
        let marker = "tracing-disabled";
        assert_eq!(marker, "tracing-disabled");
    }
}

#[tokio::test]
async fn pipeline_runs_under_a_subscriber() -> Result<()> {
    #[cfg(feature = "tracing")]
    let _guard = tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_env_filter("backflow=trace")
            .with_test_writer()
            .finish(),
    );

    let out = collected::<u32>();
    let pipe = VecSource::new((0..20u32).collect())
        .progress("numbers", 5)
        .limit(7)
        .pipe::<(), _>(CollectSink::new(out.clone()));

    Runtime::new().buffer(2).run(pipe).await?;

    assert_eq!(out.lock().expect("mutex poisoned").len(), 7);
    Ok(())
}
