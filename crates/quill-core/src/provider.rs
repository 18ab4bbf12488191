use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::context::GenerationContext;
use crate::errors::GatewayError;

/// Text chunks as they arrive. The caller concatenates them into the full response.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

/// External cognitive provider. Timeouts and retries are the implementor's concern.
///
/// Cancellation is driven by the caller: dropping the returned stream must
/// abandon the in-flight generation.
#[async_trait]
pub trait CognitiveProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, context: &GenerationContext) -> Result<ChunkStream, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Echo;

    #[async_trait]
    impl CognitiveProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, context: &GenerationContext) -> Result<ChunkStream, GatewayError> {
            let text = context.last_user_message().unwrap_or_default().to_owned();
            let chunks: Vec<Result<String, GatewayError>> =
                text.split_inclusive(' ').map(|s| Ok(s.to_owned())).collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[tokio::test]
    async fn chunks_concatenate() {
        let ctx = GenerationContext {
            system: String::new(),
            messages: vec![crate::context::ContextMessage {
                role: crate::turns::Role::User,
                content: "hello streaming world".into(),
            }],
        };
        let provider: &dyn CognitiveProvider = &Echo;
        let mut stream = provider.generate(&ctx).await.unwrap();
        let mut out = String::new();
        let mut count = 0;
        while let Some(chunk) = stream.next().await {
            out.push_str(&chunk.unwrap());
            count += 1;
        }
        assert_eq!(out, "hello streaming world");
        assert_eq!(count, 3);
    }
}
