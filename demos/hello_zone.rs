use interaction_zone::config::{GlobalScopeDescriptor, ZoneOptions};
use interaction_zone::event::InteractionEvent;
use interaction_zone::host::globals::global_this;
use interaction_zone::host::{EventTargetObject, FunctionObject, PlainObject, Value};
use interaction_zone::patcher::GlobalScopePatcher;
use interaction_zone::proxy::{InteractionDetectionProxy, ProxyInteraction, PROXY_INTERACTION};
use interaction_zone::reporting::{self, ErrorEvent};
use interaction_zone::zone::{ErrorPropagation, InteractionType, ZoneFutureExt};
use interaction_zone::{ExecutionError, InteractionZone};
use std::sync::Arc;
use std::time::Duration;

const FORM: InteractionType = InteractionType::new("form");
const FORM_SUBMIT: u32 = 0b01;
const FORM_RESET: u32 = 0b10;

#[tokio::main]
async fn main() -> Result<(), ExecutionError> {
    env_logger::init();

    // Make panics inside zones go through the zone error listeners
    reporting::install_global_handlers();

    // Patch the global scope once. From now on promises, event listeners, observers and
    // timers created through the globals resume in the zone that created them.
    let globals = global_this();
    let patcher = GlobalScopePatcher::new(GlobalScopeDescriptor::default());
    patcher.enable(globals);

    // Zones form a tree below the root zone. The checkout zone only wants to hear about
    // form submits; resets raised inside it never reach its listeners (or the ones above).
    let app = InteractionZone::root().create("app", ZoneOptions::default());
    let checkout = app.create("checkout", ZoneOptions::default());
    checkout.add_trigger_restriction(FORM, FORM_SUBMIT);

    app.add_interaction_listener(
        FORM,
        Arc::new(|event: &InteractionEvent| {
            println!(
                "[app] '{}' trigger {:#b} from zone '{}'",
                event.interaction_type(),
                event.trigger(),
                event.origin()
            );
        }),
    );

    checkout.execute(|| {
        InteractionZone::push_interaction(FORM, FORM_SUBMIT, "order #1");
        InteractionZone::push_interaction(FORM, FORM_RESET, "order #1");
    });

    // Errors thrown inside a zone are allocated to it. The checkout zone swallows them so
    // the default reporting (a log line) does not happen.
    checkout.add_error_listener(Arc::new(|event: &ErrorEvent| {
        println!("[checkout] handled: {}", event);
        ErrorPropagation::Suppress
    }));
    let err = checkout
        .try_execute(|| Err::<(), _>(ExecutionError::msg("payment declined")))
        .unwrap_err();
    reporting::report_uncaught_error(&err);

    // Detection proxies turn reads, writes and calls into interaction events.
    let cart = PlainObject::from_entries([("items", Value::from(0))]);
    let detector = InteractionDetectionProxy::new(cart).ok_or("cart is excluded from detection")?;
    detector.add_listener_zone(&app);
    app.add_interaction_listener(
        PROXY_INTERACTION,
        Arc::new(|event: &InteractionEvent| {
            if let Some(data) = event.data::<ProxyInteraction>() {
                println!("[app] proxy {:?} on {:?}", data.property, data.source);
            }
        }),
    );
    checkout.execute(|| detector.proxy().set("items", 3))?;

    // Event listeners run in the zone that added them, whoever fires the event.
    let signal_class = globals.get("AbortSignal")?;
    let signal = signal_class
        .as_object()
        .ok_or("AbortSignal is missing")?
        .construct(vec![])?;
    let signal = signal.as_object().ok_or("AbortSignal did not construct an object")?;
    let on_abort = FunctionObject::new("onabort", |_, _| {
        println!("abort handled in zone '{}'", InteractionZone::current());
        Ok(Value::Undefined)
    });
    checkout.execute(|| signal.set("onabort", on_abort))?;
    EventTargetObject::fire(signal, "abort", Value::Undefined)?;

    // Timers keep the zone too, and so do futures bound with `in_zone`.
    let set_timeout = globals.get("setTimeout")?;
    let tick = FunctionObject::new("tick", |_, _| {
        println!("timer fired in zone '{}'", InteractionZone::current());
        Ok(Value::Undefined)
    });
    app.execute(|| {
        set_timeout
            .as_object()
            .map(|f| f.call(Value::Undefined, vec![tick.into(), 10.into()]))
    })
    .transpose()?;

    async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        println!("future resumed in zone '{}'", InteractionZone::current());
    }
    .in_zone(&checkout)
    .await;

    Ok(())
}
