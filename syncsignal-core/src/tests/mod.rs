/*
    Scenario tests for syncsignal-core

    Test suite covering:
    - Last-writer-wins resolution and watermark behavior
    - Envelope codec properties
    - Scalar units: bootstrap, manual and throttled auto-sync
    - Structured units: path patches and manual sync
    - Facade: registry lookups, clearing, enumeration, capability probes
    - Fallback transports: durable-store events and polling
*/


pub mod facade_scenarios;
pub mod scalar_scenarios;
