use std::sync::Arc;

use anyhow::{Context, Result};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use praxis_auth::prelude::*;
use praxis_auth::{BusinessHours, InMemoryAuditLog, IpAllowList};

use crate::cli::EvaluateArgs;
use crate::fixtures::Fixtures;
use crate::output::{print_denied, print_json, print_success};

pub async fn evaluate(args: &EvaluateArgs) -> Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let seeded = Fixtures::load(&args.fixtures)?.seed(&config).await?;
    tracing::debug!(
        fixtures = %args.fixtures.display(),
        subjects = seeded.subjects.len(),
        resources = seeded.loader.len(),
        "Fixtures seeded"
    );

    let subject = args
        .subject
        .as_deref()
        .map(|id| seeded.subject(id))
        .transpose()?;
    let action: Action = args.action.parse()?;
    let (resource_type, id) = parse_resource(&args.resource)?;

    let mut request = AuthorizeRequest::new(subject, action, resource_type)
        .with_context(context(args)?);
    if let Some(id) = id {
        request = request.with_id(id);
    }

    let sink = Arc::new(InMemoryAuditLog::new());
    let evaluator = PolicyEvaluator::from_config(&config, seeded.stores, seeded.loader, sink.clone())?;

    let decision = evaluator.authorize(request).await?;
    print_json(&decision)?;

    if decision.allowed {
        print_success(&format!("{} ({})", decision.required_permission, decision.reason));
    } else {
        print_denied(&format!("{} ({})", decision.required_permission, decision.reason));
    }
    println!("Audit entries written: {}", sink.len().await);
    Ok(())
}

fn context(args: &EvaluateArgs) -> Result<EvaluationContext> {
    let at = match &args.at {
        Some(raw) => OffsetDateTime::parse(raw, &Rfc3339)
            .with_context(|| format!("--at '{raw}' is not an RFC 3339 timestamp"))?,
        None => OffsetDateTime::now_utc(),
    };
    let mut context = EvaluationContext::new(at);
    if let Some(ip) = args.ip {
        context = context.with_source_ip(ip);
    }

    let mut constraints = ConstraintSet::new();
    if args.business_hours {
        constraints = constraints.with_business_hours(BusinessHours::default());
    }
    if !args.allow_cidrs.is_empty() {
        constraints = constraints.with_ip_allow_list(IpAllowList::parse(&args.allow_cidrs)?);
    }
    if constraints != ConstraintSet::new() {
        context = context.with_constraints(constraints);
    }
    Ok(context)
}

/// Splits `patient/p-1042` into its type and id; a bare type has no id.
fn parse_resource(raw: &str) -> Result<(ResourceType, Option<String>)> {
    match raw.split_once('/') {
        Some((rt, id)) if !id.is_empty() => Ok((rt.parse()?, Some(id.to_string()))),
        Some((rt, _)) => Ok((rt.parse()?, None)),
        None => Ok((raw.parse()?, None)),
    }
}
