//! Sampler construction from the resolved sampling configuration.

use crate::config::{SamplerKind, SamplingConfig};
use opentelemetry_sdk::trace::Sampler;

/// Maps the sampling configuration onto an SDK sampler.
///
/// The match is exhaustive over [`SamplerKind`]; unrecognised option strings
/// never reach this point, they fail at the parse boundary.
pub(crate) fn build_sampler(config: &SamplingConfig) -> Sampler {
    match config.kind {
        SamplerKind::AlwaysOff => Sampler::AlwaysOff,
        SamplerKind::AlwaysOn => Sampler::AlwaysOn,
        SamplerKind::ParentBasedAlwaysOn => Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
        SamplerKind::ParentBasedAlwaysOff => Sampler::ParentBased(Box::new(Sampler::AlwaysOff)),
        SamplerKind::ParentBasedTraceIdRatio => {
            Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(config.ratio)))
        }
        SamplerKind::TraceIdRatio => Sampler::TraceIdRatioBased(config.ratio),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Context;
    use opentelemetry::trace::{
        SamplingDecision, SpanContext, SpanId, SpanKind, TraceContextExt, TraceFlags, TraceId,
        TraceState,
    };
    use opentelemetry_sdk::trace::ShouldSample;

    fn sampler(kind: SamplerKind, ratio: f64) -> Sampler {
        build_sampler(&SamplingConfig { kind, ratio })
    }

    fn decide(sampler: &Sampler, parent: Option<&Context>) -> SamplingDecision {
        sampler
            .should_sample(
                parent,
                TraceId::from_u128(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
                "test-span",
                &SpanKind::Internal,
                &[],
                &[],
            )
            .decision
    }

    fn parent_context(sampled: bool) -> Context {
        let flags = if sampled {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        };
        let span_context = SpanContext::new(
            TraceId::from_u128(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
            SpanId::from_u64(0x00f0_67aa_0ba9_02b7),
            flags,
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }

    #[test]
    fn always_off_drops_root_spans() {
        assert_eq!(decide(&sampler(SamplerKind::AlwaysOff, 1.0), None), SamplingDecision::Drop);
    }

    #[test]
    fn always_on_samples_root_spans() {
        assert_eq!(
            decide(&sampler(SamplerKind::AlwaysOn, 0.0), None),
            SamplingDecision::RecordAndSample
        );
    }

    #[test]
    fn parent_based_always_on_samples_roots_and_respects_parent() {
        let s = sampler(SamplerKind::ParentBasedAlwaysOn, 1.0);
        assert_eq!(decide(&s, None), SamplingDecision::RecordAndSample);
        assert_eq!(
            decide(&s, Some(&parent_context(true))),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(decide(&s, Some(&parent_context(false))), SamplingDecision::Drop);
    }

    #[test]
    fn parent_based_always_off_drops_roots_and_respects_parent() {
        let s = sampler(SamplerKind::ParentBasedAlwaysOff, 1.0);
        assert_eq!(decide(&s, None), SamplingDecision::Drop);
        assert_eq!(
            decide(&s, Some(&parent_context(true))),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(decide(&s, Some(&parent_context(false))), SamplingDecision::Drop);
    }

    #[test]
    fn parent_based_ratio_applies_ratio_only_to_roots() {
        let never = sampler(SamplerKind::ParentBasedTraceIdRatio, 0.0);
        assert_eq!(decide(&never, None), SamplingDecision::Drop);
        assert_eq!(
            decide(&never, Some(&parent_context(true))),
            SamplingDecision::RecordAndSample
        );

        let always = sampler(SamplerKind::ParentBasedTraceIdRatio, 1.0);
        assert_eq!(decide(&always, None), SamplingDecision::RecordAndSample);
        assert_eq!(decide(&always, Some(&parent_context(false))), SamplingDecision::Drop);
    }

    #[test]
    fn trace_id_ratio_ignores_parent_decision() {
        let never = sampler(SamplerKind::TraceIdRatio, 0.0);
        assert_eq!(decide(&never, None), SamplingDecision::Drop);
        assert_eq!(decide(&never, Some(&parent_context(true))), SamplingDecision::Drop);

        let always = sampler(SamplerKind::TraceIdRatio, 1.0);
        assert_eq!(decide(&always, None), SamplingDecision::RecordAndSample);
        assert_eq!(
            decide(&always, Some(&parent_context(false))),
            SamplingDecision::RecordAndSample
        );
    }
}
