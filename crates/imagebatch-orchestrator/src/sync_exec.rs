//! Inline generation for models without a batch API

use std::sync::Arc;

use futures_util::{StreamExt, stream};

use crate::{
    artifact::ArtifactStore,
    error::Result,
    provider::ImageGenerator,
    types::{GeneratedImage, ResultItem, RoutedItem},
};

/// Generate and persist every item, at most `concurrency` at a time
///
/// Never fails as a whole: each item ends up with exactly one success or
/// error, and results come back in input order. Each in-flight future owns
/// its item and client handles, so the whole call can move across threads.
pub(crate) async fn run_synchronous(
    generator: Arc<dyn ImageGenerator>,
    artifacts: Arc<dyn ArtifactStore>,
    items: Vec<RoutedItem>,
    concurrency: usize,
) -> Vec<ResultItem> {
    stream::iter(items)
        .map(move |item| {
            let generator = Arc::clone(&generator);
            let artifacts = Arc::clone(&artifacts);

            async move {
                match generate_one(generator.as_ref(), artifacts.as_ref(), &item).await {
                    Ok(image) => ResultItem::success(item.correlation_id, image),
                    Err(e) => {
                        tracing::warn!(
                            provider = generator.name(),
                            correlation_id = %item.correlation_id,
                            error = %e,
                            "synchronous generation failed"
                        );
                        ResultItem::error(
                            item.correlation_id,
                            format!("{} generation failed: {e}", item.model.display_name()),
                        )
                    }
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

async fn generate_one(
    generator: &dyn ImageGenerator,
    artifacts: &dyn ArtifactStore,
    item: &RoutedItem,
) -> Result<GeneratedImage> {
    let bytes = generator.generate(item).await?;
    let artifact_ref = artifacts.save(bytes).await?;

    Ok(GeneratedImage {
        artifact_ref,
        provider_label: item.model.display_name().to_string(),
    })
}
