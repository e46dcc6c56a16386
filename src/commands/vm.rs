use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{
    PowerState, RemoteResource, ResourceId, ResourceKind, VmInstance, VmOperation, inspect,
    vm_operation,
};

use super::Session;
use crate::Context;
use crate::cli::{VmCommand, VmTarget};
use crate::ui;

pub fn run(ctx: &Context, cmd: VmCommand) -> Result<()> {
    match cmd {
        VmCommand::Show(target) => show(ctx, &target),
        VmCommand::Start(target) => operate(ctx, &target, VmOperation::Start),
        VmCommand::Stop(target) => operate(ctx, &target, VmOperation::Stop),
        VmCommand::Resize { target, size } => operate(ctx, &target, VmOperation::Resize { size }),
        VmCommand::AttachDisk {
            target,
            lun,
            size_gb,
            caching,
        } => operate(
            ctx,
            &target,
            VmOperation::AttachDisk {
                lun,
                size_gb,
                caching,
            },
        ),
        VmCommand::Deallocate(target) => operate(ctx, &target, VmOperation::Deallocate),
    }
}

fn vm_id(target: &VmTarget) -> ResourceId {
    ResourceId::new(ResourceKind::VirtualMachine, target.name.clone())
}

fn operate(ctx: &Context, target: &VmTarget, op: VmOperation) -> Result<()> {
    let mut session = Session::open(ctx, &target.file)?;
    let id = vm_id(target);
    let recorded = session
        .state
        .stack(&session.stack.name)
        .map(|s| s.state_of(&id))
        .unwrap_or_default();

    ui::info(&format!("Running '{op}' on {id}..."));
    let vm = vm_operation(
        &session.stack.graph,
        &id,
        recorded,
        &session.provider,
        &op,
        &ctx.settings.retry,
    )
    .with_context(|| format!("Failed to {op} {id}"))?;
    session.save(ctx)?;

    ui::success(&format!("{id}: {}, size {}", vm.power, vm.size));
    if matches!(op, VmOperation::AttachDisk { .. }) {
        ui::dim(&format!("{} data disks attached", vm.data_disks.len()));
    }
    Ok(())
}

fn show(ctx: &Context, target: &VmTarget) -> Result<()> {
    let session = Session::open(ctx, &target.file)?;
    let id = vm_id(target);
    let remote = inspect(&session.provider, &id, &ctx.settings.retry)
        .with_context(|| format!("Failed to read {id}"))?;
    let vm = remote
        .vm
        .as_ref()
        .with_context(|| format!("{id} has no virtual machine details"))?;

    ui::header(&format!("Virtual machine '{}'", id.name));
    print_instance(vm);
    print_general(&remote, vm);
    Ok(())
}

fn print_instance(vm: &VmInstance) {
    ui::section("Hardware profile");
    ui::kv("vmSize", &vm.size);

    ui::section("Storage profile");
    match &vm.image {
        Some(image) => {
            ui::kv("publisher", &image.publisher);
            ui::kv("offer", &image.offer);
            ui::kv("sku", &image.sku);
            ui::kv("version", &image.version);
        }
        None => ui::dim("no image reference"),
    }
    ui::kv("osDisk", &vm.os_disk);
    if vm.data_disks.is_empty() {
        ui::dim("no data disks");
    }
    for disk in &vm.data_disks {
        ui::kv(
            &format!("lun {}", disk.lun),
            &format!("{} ({} GB, caching {})", disk.name, disk.size_gb, disk.caching),
        );
    }

    ui::section("OS profile");
    ui::kv("computerName", &vm.computer_name);
    ui::kv(
        "adminUsername",
        vm.admin_username.as_deref().unwrap_or("(not set)"),
    );

    ui::section("Network profile");
    for nic in &vm.network_interfaces {
        ui::kv("networkInterface", &nic.to_string());
    }
    if let Some(avset) = &vm.availability_set {
        ui::kv("availabilitySet", &avset.to_string());
    }
}

fn print_general(remote: &RemoteResource, vm: &VmInstance) {
    ui::section("Status");
    ui::kv("provisioningState", &remote.provisioning_state);
    ui::kv("id", &remote.id.to_string());
    if let Some(region) = remote
        .attributes
        .get("region")
        .or_else(|| remote.attributes.get("location"))
        .and_then(|v| v.as_str())
    {
        ui::kv("location", region);
    }

    let power = match vm.power {
        PowerState::Running => vm.power.to_string().green(),
        PowerState::Stopped | PowerState::Deallocated => vm.power.to_string().yellow(),
        PowerState::Transitioning => vm.power.to_string().cyan(),
    };
    ui::kv("code", vm.power.code());
    ui::kv("displayStatus", &power.to_string());
}
