/// Execute an aggregate command deterministically (no IO, no async).
///
/// Decide via `handle`, then evolve the aggregate in place via `apply` for
/// each emitted event. For the full pipeline (persistence, publication,
/// optimistic concurrency) use the infra command dispatcher instead.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: revamp_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
